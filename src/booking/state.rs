//! Booking wizard state machine: step kinds and the per-pattern step table.
//!
//! Every pattern is a fixed, ordered list of [`StepSpec`] entries. Each entry
//! declares which accumulator fields the step may write, which must be filled
//! once the step is passed, and which it needs from earlier steps.

use serde::{Deserialize, Serialize};

use super::model::BookingPattern;

/// Accumulator fields, at the granularity steps own them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    BookingType,
    Therapist,
    Site,
    Courses,
    Options,
    /// `scheduled_date`, `scheduled_time`, `scheduled_at`.
    Schedule,
    /// `total_duration`, `total_price`.
    Totals,
    /// `dispatch_address`, `dispatch_lat`, `dispatch_lng`.
    Dispatch,
    Notes,
    Recommendations,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BookingType => "type",
            Self::Therapist => "therapist",
            Self::Site => "site",
            Self::Courses => "courses",
            Self::Options => "options",
            Self::Schedule => "schedule",
            Self::Totals => "totals",
            Self::Dispatch => "dispatch",
            Self::Notes => "notes",
            Self::Recommendations => "recommendations",
        };
        write!(f, "{s}")
    }
}

/// The views a wizard can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Site,
    Therapist,
    Menu,
    MenuSite,
    DateTime,
    ConfirmPay,
    Complete,
    Chat,
    AiSuggestion,
    /// Identity verification. Shown through a gate, never part of a table.
    Kyc,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Site => "site",
            Self::Therapist => "therapist",
            Self::Menu => "menu",
            Self::MenuSite => "menu_site",
            Self::DateTime => "date_time",
            Self::ConfirmPay => "confirm_pay",
            Self::Complete => "complete",
            Self::Chat => "chat",
            Self::AiSuggestion => "ai_suggestion",
            Self::Kyc => "kyc",
        };
        write!(f, "{s}")
    }
}

/// A check inserted in front of the normal step progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardGate {
    Kyc,
}

impl WizardGate {
    /// The view shown while the gate is pending.
    pub fn view(&self) -> StepKind {
        match self {
            Self::Kyc => StepKind::Kyc,
        }
    }
}

impl std::fmt::Display for WizardGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kyc => write!(f, "identity verification"),
        }
    }
}

/// Contract of one step in a pattern's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSpec {
    pub kind: StepKind,
    /// Fields this step may write.
    pub owns: &'static [Field],
    /// Fields that must be filled when leaving this step forward.
    pub mandatory: &'static [Field],
    /// Fields an earlier step (or a seed) must have filled.
    pub requires: &'static [Field],
}

impl StepSpec {
    pub fn owns(&self, field: Field) -> bool {
        self.owns.contains(&field)
    }
}

const PLACEMENT: &[Field] = &[Field::Site, Field::BookingType, Field::Dispatch];

const SITE: StepSpec = StepSpec {
    kind: StepKind::Site,
    owns: PLACEMENT,
    mandatory: &[Field::BookingType],
    requires: &[],
};

const THERAPIST: StepSpec = StepSpec {
    kind: StepKind::Therapist,
    owns: &[Field::Therapist],
    mandatory: &[Field::Therapist],
    requires: &[],
};

const MENU: StepSpec = StepSpec {
    kind: StepKind::Menu,
    owns: &[Field::Courses, Field::Options, Field::Totals],
    mandatory: &[Field::Courses, Field::Totals],
    requires: &[Field::Therapist],
};

const MENU_SITE: StepSpec = StepSpec {
    kind: StepKind::MenuSite,
    owns: &[
        Field::Courses,
        Field::Options,
        Field::Totals,
        Field::Site,
        Field::BookingType,
        Field::Dispatch,
    ],
    mandatory: &[Field::Courses, Field::Totals, Field::BookingType],
    requires: &[Field::Therapist],
};

const DATE_TIME: StepSpec = StepSpec {
    kind: StepKind::DateTime,
    owns: &[Field::Schedule],
    mandatory: &[Field::Schedule],
    requires: &[Field::Courses],
};

const CONFIRM_PAY: StepSpec = StepSpec {
    kind: StepKind::ConfirmPay,
    owns: &[Field::Notes],
    mandatory: &[],
    requires: &[Field::Courses, Field::Schedule, Field::BookingType],
};

const COMPLETE: StepSpec = StepSpec {
    kind: StepKind::Complete,
    owns: &[],
    mandatory: &[],
    requires: &[],
};

const CHAT: StepSpec = StepSpec {
    kind: StepKind::Chat,
    owns: &[Field::Recommendations],
    mandatory: &[Field::Recommendations],
    requires: &[],
};

const AI_SUGGESTION: StepSpec = StepSpec {
    kind: StepKind::AiSuggestion,
    owns: &[
        Field::Therapist,
        Field::Courses,
        Field::Options,
        Field::Totals,
        Field::Site,
        Field::BookingType,
        Field::Dispatch,
    ],
    mandatory: &[
        Field::Therapist,
        Field::Courses,
        Field::Totals,
        Field::BookingType,
    ],
    requires: &[Field::Recommendations],
};

const FROM_MAP_STEPS: &[StepSpec] = &[SITE, THERAPIST, MENU, DATE_TIME, CONFIRM_PAY, COMPLETE];
const FROM_THERAPIST_STEPS: &[StepSpec] =
    &[THERAPIST, SITE, MENU, DATE_TIME, CONFIRM_PAY, COMPLETE];
const DIRECT_STEPS: &[StepSpec] = &[MENU_SITE, DATE_TIME, CONFIRM_PAY, COMPLETE];
const AI_RECOMMEND_STEPS: &[StepSpec] = &[CHAT, AI_SUGGESTION, DATE_TIME, CONFIRM_PAY, COMPLETE];

impl BookingPattern {
    /// The ordered step table of this pattern.
    pub fn steps(&self) -> &'static [StepSpec] {
        match self {
            Self::FromMap => FROM_MAP_STEPS,
            Self::FromTherapist => FROM_THERAPIST_STEPS,
            Self::Direct => DIRECT_STEPS,
            Self::AiRecommend => AI_RECOMMEND_STEPS,
        }
    }

    pub fn step_count(&self) -> usize {
        self.steps().len()
    }

    /// Fields a wizard of this pattern must be seeded with at mount.
    pub fn seed_requirements(&self) -> &'static [Field] {
        match self {
            // Instant booking starts from a therapist page; the menu is theirs.
            Self::Direct => &[Field::Therapist],
            Self::FromMap | Self::FromTherapist | Self::AiRecommend => &[],
        }
    }

    /// Check the table's internal consistency.
    ///
    /// Every required field must be seeded or owned by an earlier step, and
    /// the table must end with confirmation followed by completion.
    pub fn validate_table(&self) -> Result<(), String> {
        let steps = self.steps();
        let n = steps.len();
        if n < 2
            || steps[n - 1].kind != StepKind::Complete
            || steps[n - 2].kind != StepKind::ConfirmPay
        {
            return Err(format!("{self}: table must end with confirm_pay, complete"));
        }

        let mut provided: Vec<Field> = self.seed_requirements().to_vec();
        for spec in steps {
            if spec.kind == StepKind::Kyc {
                return Err(format!("{self}: kyc is a gate, not a step"));
            }
            for field in spec.requires {
                if !provided.contains(field) {
                    return Err(format!(
                        "{self}: step {} requires {field} but nothing before it provides it",
                        spec.kind
                    ));
                }
            }
            for field in spec.mandatory {
                if !spec.owns(*field) {
                    return Err(format!(
                        "{self}: step {} mandates {field} it does not own",
                        spec.kind
                    ));
                }
            }
            provided.extend(spec.owns.iter().copied());
        }
        Ok(())
    }
}
