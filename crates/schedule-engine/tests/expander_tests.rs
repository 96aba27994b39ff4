//! Tests for recurrence expansion.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use schedule_engine::dst::DstPolicy;
use schedule_engine::expander::{expand, expand_all, find_candidate, ExpansionPolicy};
use schedule_engine::model::{
    RecurrenceDraft, RepeatKind, Schedule, ScheduleDraft, ScheduleInstance, ScheduleRecord,
    ScheduleRecurring, Window,
};
use schedule_engine::range::{date_range_window, month_window};

// ── Helpers ─────────────────────────────────────────────────────────────────

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn schedule(id: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Schedule {
    ScheduleDraft::new(1, start, end).into_schedule(id)
}

fn days(from: NaiveDate, to: NaiveDate) -> Window {
    date_range_window(from, to, Tz::UTC).unwrap()
}

fn utc() -> ExpansionPolicy {
    ExpansionPolicy::default()
}

// ── Non-recurring ───────────────────────────────────────────────────────────

#[test]
fn single_schedule_inside_window_is_one_occurrence() {
    let s = schedule(1, at(2026, 3, 2, 9, 0), at(2026, 3, 2, 10, 0));
    let result = expand(&s, None, &[], &days(date(2026, 3, 1), date(2026, 3, 7)), &utc());

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].start, s.start);
    assert_eq!(result[0].end, s.end);
    assert!(!result[0].is_exception);
}

#[test]
fn single_schedule_outside_window_is_dropped() {
    let s = schedule(1, at(2026, 3, 9, 9, 0), at(2026, 3, 9, 10, 0));
    let result = expand(&s, None, &[], &days(date(2026, 3, 1), date(2026, 3, 7)), &utc());
    assert!(result.is_empty());
}

#[test]
fn single_schedule_touching_window_start_counts() {
    // Ends exactly at the window start: closed overlap includes it.
    let s = schedule(1, at(2026, 2, 28, 23, 0), at(2026, 3, 1, 0, 0));
    let result = expand(&s, None, &[], &days(date(2026, 3, 1), date(2026, 3, 7)), &utc());
    assert_eq!(result.len(), 1);
}

// ── Daily ───────────────────────────────────────────────────────────────────

#[test]
fn daily_rule_fills_a_seven_day_window() {
    let s = schedule(1, at(2026, 1, 5, 9, 0), at(2026, 1, 5, 9, 30));
    let rule = RecurrenceDraft::daily(1).into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 3, 2), date(2026, 3, 8)), &utc());

    assert_eq!(result.len(), 7);
    for (i, occurrence) in result.iter().enumerate() {
        let day = 2 + i as u32;
        assert_eq!(occurrence.start, at(2026, 3, day, 9, 0), "day {} start", day);
        assert_eq!(occurrence.end, at(2026, 3, day, 9, 30), "day {} end", day);
        assert_eq!(occurrence.original_start, occurrence.start);
    }
}

#[test]
fn daily_interval_steps_from_the_template() {
    let s = schedule(1, at(2026, 3, 1, 9, 0), at(2026, 3, 1, 9, 30));
    let rule = RecurrenceDraft::daily(3).into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 3, 1), date(2026, 3, 10)), &utc());

    let starts: Vec<_> = result.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            at(2026, 3, 1, 9, 0),
            at(2026, 3, 4, 9, 0),
            at(2026, 3, 7, 9, 0),
            at(2026, 3, 10, 9, 0),
        ]
    );
}

#[test]
fn nothing_before_the_template() {
    let s = schedule(1, at(2026, 3, 5, 9, 0), at(2026, 3, 5, 9, 30));
    let rule = RecurrenceDraft::daily(1).into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 3, 1), date(2026, 3, 7)), &utc());

    assert_eq!(result.len(), 3, "Mar 5, 6, 7 only");
    assert_eq!(result[0].start, s.start);
}

#[test]
fn repeat_end_date_is_inclusive() {
    let s = schedule(1, at(2026, 3, 1, 9, 0), at(2026, 3, 1, 9, 30));
    let rule = RecurrenceDraft::daily(1).until(date(2026, 3, 4)).into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 3, 1), date(2026, 3, 31)), &utc());

    assert_eq!(result.len(), 4, "Mar 1-4");
    assert_eq!(result[3].start, at(2026, 3, 4, 9, 0));
}

#[test]
fn occurrence_running_into_the_window_is_included() {
    // 23:00 - 01:00 every day.
    let s = schedule(1, at(2026, 3, 1, 23, 0), at(2026, 3, 2, 1, 0));
    let rule = RecurrenceDraft::daily(1).into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 3, 5), date(2026, 3, 5)), &utc());

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].start, at(2026, 3, 4, 23, 0));
    assert_eq!(result[1].start, at(2026, 3, 5, 23, 0));
}

// ── Weekly ──────────────────────────────────────────────────────────────────

#[test]
fn weekly_mon_wed_fri_four_weeks_is_twelve() {
    // 2026-03-02 is a Monday.
    let s = schedule(1, at(2026, 3, 2, 10, 0), at(2026, 3, 2, 10, 45));
    let rule = RecurrenceDraft::weekly(1, [1, 3, 5]).into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 3, 2), date(2026, 3, 29)), &utc());

    assert_eq!(result.len(), 12);
    assert_eq!(result[0].start, at(2026, 3, 2, 10, 0));
    assert_eq!(result[1].start, at(2026, 3, 4, 10, 0));
    assert_eq!(result[2].start, at(2026, 3, 6, 10, 0));
    assert_eq!(result[11].start, at(2026, 3, 27, 10, 0));
    assert!(result.iter().all(|o| o.end - o.start == Duration::minutes(45)));
}

#[test]
fn biweekly_tue_thu_skips_alternate_weeks() {
    // 2026-03-03 is a Tuesday.
    let s = schedule(1, at(2026, 3, 3, 11, 0), at(2026, 3, 3, 12, 0));
    let rule = RecurrenceDraft::weekly(2, [2, 4]).into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 3, 1), date(2026, 3, 31)), &utc());

    let starts: Vec<_> = result.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            at(2026, 3, 3, 11, 0),
            at(2026, 3, 5, 11, 0),
            at(2026, 3, 17, 11, 0),
            at(2026, 3, 19, 11, 0),
            at(2026, 3, 31, 11, 0),
        ]
    );
}

#[test]
fn template_off_the_weekday_set_is_still_the_first_occurrence() {
    // Template on Monday, rule on Wednesdays only.
    let s = schedule(1, at(2026, 3, 2, 10, 0), at(2026, 3, 2, 11, 0));
    let rule = RecurrenceDraft::weekly(1, [3]).into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 3, 1), date(2026, 3, 7)), &utc());

    let starts: Vec<_> = result.iter().map(|o| o.start).collect();
    assert_eq!(starts, vec![at(2026, 3, 2, 10, 0), at(2026, 3, 4, 10, 0)]);
}

#[test]
fn weekly_end_date_mid_week_is_inclusive() {
    let s = schedule(1, at(2026, 3, 2, 10, 0), at(2026, 3, 2, 11, 0));
    let rule = RecurrenceDraft::weekly(1, [1, 3, 5])
        .until(date(2026, 3, 4))
        .into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 3, 1), date(2026, 3, 31)), &utc());

    let starts: Vec<_> = result.iter().map(|o| o.start).collect();
    assert_eq!(starts, vec![at(2026, 3, 2, 10, 0), at(2026, 3, 4, 10, 0)]);
}

// ── Monthly / yearly ────────────────────────────────────────────────────────

#[test]
fn monthly_on_the_31st_clamps_to_month_end() {
    let s = schedule(1, at(2026, 1, 31, 8, 0), at(2026, 1, 31, 9, 0));
    let rule = RecurrenceDraft::monthly(1, 31).into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 1, 1), date(2026, 6, 30)), &utc());

    let starts: Vec<_> = result.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            at(2026, 1, 31, 8, 0),
            at(2026, 2, 28, 8, 0),
            at(2026, 3, 31, 8, 0),
            at(2026, 4, 30, 8, 0),
            at(2026, 5, 31, 8, 0),
            at(2026, 6, 30, 8, 0),
        ]
    );
}

#[test]
fn monthly_every_third_month() {
    let s = schedule(1, at(2026, 1, 15, 8, 0), at(2026, 1, 15, 9, 0));
    let rule = RecurrenceDraft::monthly(3, 15).into_rule(1);

    let result = expand(&s, Some(&rule), &[], &days(date(2026, 1, 1), date(2026, 12, 31)), &utc());

    let starts: Vec<_> = result.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            at(2026, 1, 15, 8, 0),
            at(2026, 4, 15, 8, 0),
            at(2026, 7, 15, 8, 0),
            at(2026, 10, 15, 8, 0),
        ]
    );
}

#[test]
fn yearly_leap_day_clamps_in_common_years() {
    let s = schedule(1, at(2020, 2, 29, 12, 0), at(2020, 2, 29, 13, 0));
    let rule = RecurrenceDraft::yearly(1, 2).into_rule(1);

    let feb_2023 = month_window(2023, 2, Tz::UTC).unwrap();
    let result = expand(&s, Some(&rule), &[], &feb_2023, &utc());
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].start, at(2023, 2, 28, 12, 0));

    let feb_2024 = month_window(2024, 2, Tz::UTC).unwrap();
    let result = expand(&s, Some(&rule), &[], &feb_2024, &utc());
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].start, at(2024, 2, 29, 12, 0));
}

// ── Exceptions ──────────────────────────────────────────────────────────────

fn daily_from_march_first() -> (Schedule, ScheduleRecurring) {
    let s = schedule(4, at(2026, 3, 1, 9, 0), at(2026, 3, 1, 9, 30));
    let rule = RecurrenceDraft::daily(1).into_rule(4);
    (s, rule)
}

#[test]
fn cancelled_instance_removes_exactly_that_occurrence() {
    let (s, rule) = daily_from_march_first();
    let cancel = ScheduleInstance::cancellation(
        4,
        at(2026, 3, 4, 9, 0),
        at(2026, 3, 4, 9, 30),
        Some("skipped".into()),
    );

    let result = expand(
        &s,
        Some(&rule),
        &[cancel],
        &days(date(2026, 3, 2), date(2026, 3, 8)),
        &utc(),
    );

    assert_eq!(result.len(), 6);
    assert!(result.iter().all(|o| o.start != at(2026, 3, 4, 9, 0)));
}

#[test]
fn instance_of_another_schedule_is_ignored() {
    let (s, rule) = daily_from_march_first();
    let other = ScheduleInstance::cancellation(99, at(2026, 3, 4, 9, 0), at(2026, 3, 4, 9, 30), None);

    let result = expand(
        &s,
        Some(&rule),
        &[other],
        &days(date(2026, 3, 2), date(2026, 3, 8)),
        &utc(),
    );
    assert_eq!(result.len(), 7);
}

#[test]
fn moved_instance_replaces_start_and_end() {
    let (s, rule) = daily_from_march_first();
    let moved = ScheduleInstance::moved(
        4,
        at(2026, 3, 4, 9, 0),
        at(2026, 3, 4, 9, 30),
        at(2026, 3, 4, 15, 0),
        at(2026, 3, 4, 15, 30),
        Some("after lunch".into()),
    )
    .unwrap();

    let result = expand(
        &s,
        Some(&rule),
        &[moved],
        &days(date(2026, 3, 2), date(2026, 3, 8)),
        &utc(),
    );

    assert_eq!(result.len(), 7);
    let shifted = result
        .iter()
        .find(|o| o.original_start == at(2026, 3, 4, 9, 0))
        .expect("moved occurrence present");
    assert_eq!(shifted.start, at(2026, 3, 4, 15, 0));
    assert_eq!(shifted.end, at(2026, 3, 4, 15, 30));
    assert!(shifted.is_exception);
    assert_eq!(shifted.exception_memo.as_deref(), Some("after lunch"));
}

#[test]
fn moved_out_of_the_window_is_filtered_on_the_new_interval() {
    let (s, rule) = daily_from_march_first();
    let moved = ScheduleInstance::moved(
        4,
        at(2026, 3, 5, 9, 0),
        at(2026, 3, 5, 9, 30),
        at(2026, 3, 20, 9, 0),
        at(2026, 3, 20, 9, 30),
        None,
    )
    .unwrap();

    let result = expand(
        &s,
        Some(&rule),
        &[moved],
        &days(date(2026, 3, 2), date(2026, 3, 8)),
        &utc(),
    );

    assert_eq!(result.len(), 6);
    assert!(result.iter().all(|o| o.original_start != at(2026, 3, 5, 9, 0)));
}

#[test]
fn moved_into_the_window_from_a_later_date_is_included() {
    let (s, rule) = daily_from_march_first();
    let moved = ScheduleInstance::moved(
        4,
        at(2026, 3, 12, 9, 0),
        at(2026, 3, 12, 9, 30),
        at(2026, 3, 6, 14, 0),
        at(2026, 3, 6, 14, 30),
        None,
    )
    .unwrap();

    let result = expand(
        &s,
        Some(&rule),
        &[moved],
        &days(date(2026, 3, 2), date(2026, 3, 8)),
        &utc(),
    );

    assert_eq!(result.len(), 8);
    let pulled_in = result
        .iter()
        .find(|o| o.original_start == at(2026, 3, 12, 9, 0))
        .expect("pulled-in occurrence");
    assert_eq!(pulled_in.start, at(2026, 3, 6, 14, 0));
    // Sorted by actual start.
    assert!(result.windows(2).all(|w| w[0].start <= w[1].start));
}

#[test]
fn horizon_caps_open_ended_generation() {
    let (s, rule) = daily_from_march_first();
    // Original date is ~14 years past the window; beyond the 5-year horizon.
    let moved = ScheduleInstance::moved(
        4,
        at(2040, 1, 1, 9, 0),
        at(2040, 1, 1, 9, 30),
        at(2026, 3, 3, 15, 0),
        at(2026, 3, 3, 15, 30),
        None,
    )
    .unwrap();

    let result = expand(
        &s,
        Some(&rule),
        &[moved],
        &days(date(2026, 3, 2), date(2026, 3, 8)),
        &utc(),
    );
    assert_eq!(result.len(), 7);
}

// ── Malformed rules ─────────────────────────────────────────────────────────

#[test]
fn weekly_without_weekdays_degrades_to_single_occurrence() {
    let s = schedule(1, at(2026, 3, 2, 10, 0), at(2026, 3, 2, 11, 0));
    let broken = ScheduleRecurring {
        schedule_id: 1,
        repeat_kind: RepeatKind::Weekly,
        repeat_end_date: None,
        interval: 1,
        weekdays: Default::default(),
        day_of_month: None,
        month_of_year: None,
    };

    let covering = expand(&s, Some(&broken), &[], &days(date(2026, 3, 1), date(2026, 3, 31)), &utc());
    assert_eq!(covering.len(), 1);
    assert_eq!(covering[0].start, s.start);

    let later = expand(&s, Some(&broken), &[], &days(date(2026, 4, 1), date(2026, 4, 30)), &utc());
    assert!(later.is_empty());
}

#[test]
fn monthly_without_day_and_zero_interval_degrade() {
    let s = schedule(1, at(2026, 3, 2, 10, 0), at(2026, 3, 2, 11, 0));
    let no_day = ScheduleRecurring {
        day_of_month: None,
        ..RecurrenceDraft::monthly(1, 2).into_rule(1)
    };
    let zero_interval = ScheduleRecurring {
        interval: 0,
        ..RecurrenceDraft::daily(1).into_rule(1)
    };
    let window = days(date(2026, 3, 1), date(2026, 12, 31));

    assert_eq!(expand(&s, Some(&no_day), &[], &window, &utc()).len(), 1);
    assert_eq!(expand(&s, Some(&zero_interval), &[], &window, &utc()).len(), 1);
}

// ── Ordering ────────────────────────────────────────────────────────────────

#[test]
fn equal_starts_are_ordered_by_schedule_id() {
    let start = at(2026, 3, 3, 9, 0);
    let records = vec![
        ScheduleRecord::single(schedule(5, start, start + Duration::hours(1))),
        ScheduleRecord::single(schedule(2, start, start + Duration::hours(2))),
        ScheduleRecord::single(schedule(9, start - Duration::hours(1), start)),
    ];

    let result = expand_all(&records, &days(date(2026, 3, 1), date(2026, 3, 7)), &utc());

    let ids: Vec<_> = result.iter().map(|o| o.schedule_id).collect();
    assert_eq!(ids, vec![9, 2, 5]);
}

// ── Timezones ───────────────────────────────────────────────────────────────

#[test]
fn local_days_follow_the_configured_zone() {
    let seoul: Tz = "Asia/Seoul".parse().unwrap();
    // 09:00 KST on 2026-03-01.
    let s = schedule(1, at(2026, 3, 1, 0, 0), at(2026, 3, 1, 0, 30));
    let rule = RecurrenceDraft::daily(1).into_rule(1);
    let window = date_range_window(date(2026, 3, 2), date(2026, 3, 8), seoul).unwrap();

    let result = expand(&s, Some(&rule), &[], &window, &ExpansionPolicy::in_zone(seoul));

    assert_eq!(result.len(), 7);
    assert_eq!(result[0].start, at(2026, 3, 2, 0, 0));
    assert_eq!(result[6].start, at(2026, 3, 8, 0, 0));
}

#[test]
fn dst_gap_follows_policy() {
    let new_york: Tz = "America/New_York".parse().unwrap();
    // 02:30 EST on 2026-03-06; 02:30 does not exist on 2026-03-08.
    let s = schedule(1, at(2026, 3, 6, 7, 30), at(2026, 3, 6, 8, 0));
    let rule = RecurrenceDraft::daily(1).into_rule(1);
    let window = date_range_window(date(2026, 3, 6), date(2026, 3, 10), new_york).unwrap();

    let skip = ExpansionPolicy {
        dst: DstPolicy::Skip,
        ..ExpansionPolicy::in_zone(new_york)
    };
    let skipped = expand(&s, Some(&rule), &[], &window, &skip);
    assert_eq!(skipped.len(), 4);

    let shifted = expand(&s, Some(&rule), &[], &window, &ExpansionPolicy::in_zone(new_york));
    assert_eq!(shifted.len(), 5);
    // 03:00 EDT
    assert_eq!(shifted[2].start, at(2026, 3, 8, 7, 0));
    // Wall-clock time holds after the transition: 02:30 EDT.
    assert_eq!(shifted[3].start, at(2026, 3, 9, 6, 30));
}

// ── Candidate lookup ────────────────────────────────────────────────────────

#[test]
fn find_candidate_only_matches_generated_starts() {
    let s = schedule(1, at(2026, 3, 1, 9, 0), at(2026, 3, 1, 9, 30));
    let rule = RecurrenceDraft::daily(1).until(date(2026, 3, 10)).into_rule(1);

    assert_eq!(
        find_candidate(&s, Some(&rule), at(2026, 3, 4, 9, 0), &utc()),
        Some((at(2026, 3, 4, 9, 0), at(2026, 3, 4, 9, 30)))
    );
    assert_eq!(find_candidate(&s, Some(&rule), at(2026, 3, 4, 9, 15), &utc()), None);
    assert_eq!(find_candidate(&s, Some(&rule), at(2026, 3, 11, 9, 0), &utc()), None);
    assert_eq!(
        find_candidate(&s, None, s.start, &utc()),
        Some((s.start, s.end))
    );
}
