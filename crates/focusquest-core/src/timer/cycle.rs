use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Focus,
    ShortBreak,
    LongBreak,
}

impl PhaseKind {
    /// Focus phases count toward statistics and rewards; breaks do not.
    pub fn is_focus(&self) -> bool {
        matches!(self, PhaseKind::Focus)
    }

    pub fn is_break(&self) -> bool {
        !self.is_focus()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Focus => "focus",
            PhaseKind::ShortBreak => "short_break",
            PhaseKind::LongBreak => "long_break",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "focus" => Some(PhaseKind::Focus),
            "short_break" => Some(PhaseKind::ShortBreak),
            "long_break" => Some(PhaseKind::LongBreak),
            _ => None,
        }
    }
}

/// One timed segment of a cycle. Immutable once generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub kind: PhaseKind,
    /// Duration in minutes, always >= 1.
    pub duration_min: u64,
    /// 1-based position of the owning focus phase within its short cycle;
    /// a break carries the ordinal of the focus it follows.
    pub ordinal_in_short_cycle: u32,
    /// 1-based count across all focus phases of the schedule; 0 for breaks.
    pub focus_ordinal: u32,
}

impl Phase {
    /// Get phase duration in milliseconds.
    ///
    /// Uses saturating arithmetic to prevent overflow with large values.
    pub fn duration_ms(&self) -> u64 {
        self.duration_min.saturating_mul(60).saturating_mul(1000)
    }

    /// Get phase duration in seconds.
    pub fn duration_secs(&self) -> u64 {
        self.duration_min.saturating_mul(60)
    }
}

/// Tunables for schedule generation. Defaults are the classic pomodoro
/// shape: 25/5/15, long break every 4th focus, 10-minute minimum tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleParams {
    pub focus_minutes: u64,
    pub short_break_minutes: u64,
    pub long_break_minutes: u64,
    pub focuses_before_long_break: u32,
    pub minimum_tail_minutes: u64,
}

impl Default for ScheduleParams {
    fn default() -> Self {
        Self {
            focus_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            focuses_before_long_break: 4,
            minimum_tail_minutes: 10,
        }
    }
}

/// Ordered phases generated for one estimated work duration. Finite and
/// not restartable; a new cycle generates a new schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSchedule {
    pub phases: Vec<Phase>,
}

impl PhaseSchedule {
    pub fn empty() -> Self {
        Self { phases: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    pub fn focus_count(&self) -> usize {
        self.phases.iter().filter(|p| p.kind.is_focus()).count()
    }

    pub fn total_focus_min(&self) -> u64 {
        self.phases
            .iter()
            .filter(|p| p.kind.is_focus())
            .map(|p| p.duration_min)
            .sum()
    }
}

/// Generate the phase schedule for an estimated total of focus minutes.
///
/// The estimate budgets focus time only; breaks punctuate it. Focus phases
/// of up to `focus_minutes` are emitted while at least
/// `minimum_tail_minutes` of the estimate remain. A break follows a focus
/// phase only when another focus phase will follow the break, except that
/// a completed short cycle (`focuses_before_long_break` full-length
/// focuses) earns its long break even at the tail.
pub fn generate(estimated_minutes: i64, params: &ScheduleParams) -> PhaseSchedule {
    let mut phases = Vec::new();
    if estimated_minutes <= 0 {
        return PhaseSchedule { phases };
    }
    let est = estimated_minutes as u64;
    let tail = params.minimum_tail_minutes.max(1);
    if est < tail {
        phases.push(Phase {
            kind: PhaseKind::Focus,
            duration_min: est,
            ordinal_in_short_cycle: 1,
            focus_ordinal: 1,
        });
        return PhaseSchedule { phases };
    }

    let focus_len_cap = params.focus_minutes.max(1);
    let mut remaining = est;
    let mut short_cycle = 0u32;
    let mut focus_ordinal = 0u32;
    while remaining >= tail {
        let focus_len = remaining.min(focus_len_cap);
        short_cycle += 1;
        focus_ordinal += 1;
        phases.push(Phase {
            kind: PhaseKind::Focus,
            duration_min: focus_len,
            ordinal_in_short_cycle: short_cycle,
            focus_ordinal,
        });
        remaining -= focus_len;

        let earned_long = short_cycle == params.focuses_before_long_break;
        if remaining >= tail {
            if earned_long {
                phases.push(break_phase(
                    PhaseKind::LongBreak,
                    params.long_break_minutes,
                    short_cycle,
                ));
                short_cycle = 0;
            } else {
                phases.push(break_phase(
                    PhaseKind::ShortBreak,
                    params.short_break_minutes,
                    short_cycle,
                ));
            }
        } else if earned_long && focus_len == focus_len_cap {
            phases.push(break_phase(
                PhaseKind::LongBreak,
                params.long_break_minutes,
                short_cycle,
            ));
            short_cycle = 0;
        }
    }
    PhaseSchedule { phases }
}

fn break_phase(kind: PhaseKind, duration_min: u64, ordinal: u32) -> Phase {
    Phase {
        kind,
        duration_min: duration_min.max(1),
        ordinal_in_short_cycle: ordinal,
        focus_ordinal: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(schedule: &PhaseSchedule) -> Vec<(PhaseKind, u64)> {
        schedule
            .phases
            .iter()
            .map(|p| (p.kind, p.duration_min))
            .collect()
    }

    #[test]
    fn zero_and_negative_estimates_yield_empty_schedule() {
        let params = ScheduleParams::default();
        assert!(generate(0, &params).is_empty());
        assert!(generate(-5, &params).is_empty());
    }

    #[test]
    fn estimate_below_tail_is_a_single_short_focus() {
        let params = ScheduleParams::default();
        let s = generate(7, &params);
        assert_eq!(kinds(&s), vec![(PhaseKind::Focus, 7)]);
        assert_eq!(s.phases[0].focus_ordinal, 1);
    }

    #[test]
    fn single_full_focus_has_no_trailing_break() {
        let s = generate(25, &ScheduleParams::default());
        assert_eq!(kinds(&s), vec![(PhaseKind::Focus, 25)]);
    }

    #[test]
    fn fifty_minutes_is_two_focuses_around_one_short_break() {
        let s = generate(50, &ScheduleParams::default());
        assert_eq!(
            kinds(&s),
            vec![
                (PhaseKind::Focus, 25),
                (PhaseKind::ShortBreak, 5),
                (PhaseKind::Focus, 25),
            ]
        );
    }

    #[test]
    fn long_break_lands_after_fourth_focus() {
        let s = generate(115, &ScheduleParams::default());
        assert_eq!(
            kinds(&s),
            vec![
                (PhaseKind::Focus, 25),
                (PhaseKind::ShortBreak, 5),
                (PhaseKind::Focus, 25),
                (PhaseKind::ShortBreak, 5),
                (PhaseKind::Focus, 25),
                (PhaseKind::ShortBreak, 5),
                (PhaseKind::Focus, 25),
                (PhaseKind::LongBreak, 15),
                (PhaseKind::Focus, 15),
            ]
        );
        assert_eq!(s.focus_count(), 5);
        assert_eq!(s.total_focus_min(), 115);
    }

    #[test]
    fn completed_short_cycle_earns_tail_long_break() {
        let s = generate(100, &ScheduleParams::default());
        assert_eq!(s.len(), 8);
        assert_eq!(s.phases[7].kind, PhaseKind::LongBreak);
        assert_eq!(s.total_focus_min(), 100);
    }

    #[test]
    fn short_cycle_ordinal_resets_after_long_break() {
        // 8 full focuses -> two complete short cycles.
        let s = generate(200, &ScheduleParams::default());
        let focus_ordinals: Vec<u32> = s
            .phases
            .iter()
            .filter(|p| p.kind.is_focus())
            .map(|p| p.ordinal_in_short_cycle)
            .collect();
        assert_eq!(focus_ordinals, vec![1, 2, 3, 4, 1, 2, 3, 4]);
    }

    #[test]
    fn breaks_carry_zero_focus_ordinal() {
        let s = generate(115, &ScheduleParams::default());
        for p in &s.phases {
            if p.kind.is_break() {
                assert_eq!(p.focus_ordinal, 0);
            } else {
                assert!(p.focus_ordinal >= 1);
            }
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn focus_minutes_cover_the_estimate_up_to_the_tail(n in -50i64..2000) {
                let params = ScheduleParams::default();
                let s = generate(n, &params);
                if n <= 0 {
                    prop_assert!(s.is_empty());
                } else {
                    let focus: u64 = s.total_focus_min();
                    prop_assert!(focus <= n as u64);
                    prop_assert!((n as u64) - focus < params.minimum_tail_minutes);
                }
            }

            #[test]
            fn schedule_shape_is_well_formed(n in 1i64..2000) {
                let params = ScheduleParams::default();
                let s = generate(n, &params);
                prop_assert!(!s.is_empty());
                // Starts with focus, never two breaks in a row, never ends
                // on a short break.
                prop_assert!(s.phases[0].kind.is_focus());
                for w in s.phases.windows(2) {
                    prop_assert!(!(w[0].kind.is_break() && w[1].kind.is_break()));
                }
                if let Some(last) = s.phases.last() {
                    prop_assert_ne!(last.kind, PhaseKind::ShortBreak);
                }
                for p in &s.phases {
                    prop_assert!(p.duration_min >= 1);
                }
            }

            #[test]
            fn every_emitted_break_matches_its_position(n in 1i64..2000) {
                let params = ScheduleParams::default();
                let s = generate(n, &params);
                for w in s.phases.windows(2) {
                    if w[1].kind.is_break() {
                        let expect_long =
                            w[0].ordinal_in_short_cycle == params.focuses_before_long_break;
                        if expect_long {
                            prop_assert_eq!(w[1].kind, PhaseKind::LongBreak);
                        } else {
                            prop_assert_eq!(w[1].kind, PhaseKind::ShortBreak);
                        }
                    }
                }
            }
        }
    }
}
