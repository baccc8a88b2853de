//! Lesson status states and the transition rule applied before any write.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonStatus {
    Pending,
    Completed,
    Paid,
    Absent,
}

impl LessonStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(LessonStatus::Pending),
            "completed" => Some(LessonStatus::Completed),
            "paid" => Some(LessonStatus::Paid),
            "absent" => Some(LessonStatus::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LessonStatus::Pending => "pending",
            LessonStatus::Completed => "completed",
            LessonStatus::Paid => "paid",
            LessonStatus::Absent => "absent",
        }
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks whether `current` may move to `target`. Completed and Paid lessons
/// never fall back to Absent or Pending; Absent lessons never advance to
/// Completed or Paid. Everything else, including a no-op, is allowed.
pub fn check_transition(current: LessonStatus, target: LessonStatus) -> Result<(), &'static str> {
    use LessonStatus::*;
    match (current, target) {
        (Completed | Paid, Absent | Pending) => {
            Err("Completed or Paid lessons cannot be marked Absent or Pending.")
        }
        (Absent, Completed | Paid) => Err("Absent lessons cannot be marked Completed or Paid."),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LessonStatus::*;

    #[test]
    fn no_op_transitions_always_allowed() {
        for s in [Pending, Completed, Paid, Absent] {
            assert!(check_transition(s, s).is_ok(), "{} -> {}", s, s);
        }
    }

    #[test]
    fn settled_lessons_cannot_revert() {
        for current in [Completed, Paid] {
            for target in [Absent, Pending] {
                assert!(
                    check_transition(current, target).is_err(),
                    "{} -> {} must be rejected",
                    current,
                    target
                );
            }
        }
    }

    #[test]
    fn absent_lessons_cannot_advance() {
        for target in [Completed, Paid] {
            assert!(check_transition(Absent, target).is_err());
        }
        // Absent back to Pending is allowed (undo a mistaken absence).
        assert!(check_transition(Absent, Pending).is_ok());
    }

    #[test]
    fn pending_moves_anywhere() {
        for target in [Pending, Completed, Paid, Absent] {
            assert!(check_transition(Pending, target).is_ok());
        }
        // Completed may still advance to Paid.
        assert!(check_transition(Completed, Paid).is_ok());
    }

    #[test]
    fn parse_is_case_insensitive_and_strict() {
        assert_eq!(LessonStatus::parse("Paid"), Some(Paid));
        assert_eq!(LessonStatus::parse(" pending "), Some(Pending));
        assert_eq!(LessonStatus::parse("late"), None);
        assert_eq!(LessonStatus::parse(""), None);
    }
}
