//! Task / Event: a time-bounded activity of one vehicle.

use std::fmt;

/// Kind of activity a [`Task`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Driving,
    Charging,
    Parking,
    Break,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Driving => "driving",
            TaskKind::Charging => "charging",
            TaskKind::Parking => "parking",
            TaskKind::Break => "break",
        };
        write!(f, "{s}")
    }
}

/// A time-bounded activity of one vehicle.
///
/// `start_point`/`end_point` are location name handles, not owned pointers —
/// vehicles and tasks address locations through the central registry rather
/// than holding references to them, avoiding a Vehicle<->Location cycle.
#[derive(Debug, Clone)]
pub struct Task {
    pub start_time: i64,
    pub end_time: i64,
    pub start_point: String,
    pub end_point: String,
    pub kind: TaskKind,
    /// Length of the task in minutes.
    pub float_time: f64,
    /// Signed SoC change; negative is consumption, positive is charging.
    pub delta_soc: f64,
    /// Energy drain (driving) or energy delivered (charging) in kWh.
    pub consumption: f64,
    /// Additional load the vehicle carries, fraction in `[0, 1]`.
    pub level_of_loading: f64,
    /// Whether `float_time`/`delta_soc`/`consumption` have been computed.
    pub is_calculated: bool,
}

impl Task {
    /// Builds an uncalculated driving task between two locations.
    pub fn driving(
        start_time: i64,
        end_time: i64,
        start_point: impl Into<String>,
        end_point: impl Into<String>,
        level_of_loading: f64,
    ) -> Self {
        Self {
            start_time,
            end_time,
            start_point: start_point.into(),
            end_point: end_point.into(),
            kind: TaskKind::Driving,
            float_time: 0.0,
            delta_soc: 0.0,
            consumption: 0.0,
            level_of_loading,
            is_calculated: false,
        }
    }

    /// Builds a fully specified charging task at a single location.
    #[allow(clippy::too_many_arguments)]
    pub fn charging(
        start_time: i64,
        end_time: i64,
        point: impl Into<String>,
        delta_soc: f64,
        consumption: f64,
    ) -> Self {
        let point = point.into();
        Self {
            start_time,
            end_time,
            start_point: point.clone(),
            end_point: point,
            kind: TaskKind::Charging,
            float_time: (end_time - start_time) as f64,
            delta_soc,
            consumption,
            level_of_loading: 0.0,
            is_calculated: true,
        }
    }

    /// Builds a derived break task anchored at a single location.
    pub fn break_task(start_time: i64, end_time: i64, point: impl Into<String>) -> Self {
        let point = point.into();
        Self {
            start_time,
            end_time,
            start_point: point.clone(),
            end_point: point,
            kind: TaskKind::Break,
            float_time: (end_time - start_time) as f64,
            delta_soc: 0.0,
            consumption: 0.0,
            level_of_loading: 0.0,
            is_calculated: true,
        }
    }

    /// Checks whether `float_time`, `delta_soc` and `consumption` have been
    /// set. This is a field flipped explicitly by the Stepper/Resolver
    /// rather than inferred from non-zero values — a vehicle legitimately
    /// taking a zero-energy trip would otherwise read as uncalculated
    /// forever.
    pub fn is_calculated(&self) -> bool {
        self.is_calculated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driving_task_starts_uncalculated() {
        let t = Task::driving(0, 4, "depot", "site", 0.2);
        assert!(!t.is_calculated());
        assert_eq!(t.kind, TaskKind::Driving);
    }

    #[test]
    fn charging_task_is_precalculated() {
        let t = Task::charging(4, 10, "depot", 0.3, 5.0);
        assert!(t.is_calculated());
        assert_eq!(t.start_point, t.end_point);
        assert_eq!(t.float_time, 6.0);
    }

    #[test]
    fn break_task_spans_anchor_point() {
        let t = Task::break_task(4, 10, "depot");
        assert_eq!(t.kind, TaskKind::Break);
        assert_eq!(t.delta_soc, 0.0);
    }
}
