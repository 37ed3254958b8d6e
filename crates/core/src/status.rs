//! Status enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` table of the store.

use serde::{Deserialize, Serialize};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Lowercase name as stored in the lookup table.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Lifecycle of one external generation operation.
    JobStatus {
        Pending = 1 => "pending",
        Processing = 2 => "processing",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
        TimedOut = 5 => "timed_out",
        Cancelled = 6 => "cancelled",
    }
}

define_status_enum! {
    /// Lifecycle of a scene inside a project sequence.
    SceneStatus {
        Pending = 1 => "pending",
        Generating = 2 => "generating",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
        Cancelled = 5 => "cancelled",
        /// Never attempted because the sequence was cancelled first.
        Skipped = 6 => "skipped",
    }
}

impl JobStatus {
    /// All statuses with no outgoing transition.
    pub const TERMINAL: [JobStatus; 4] = [
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::TimedOut,
        JobStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// Statuses a job may move to `next` from.
    ///
    /// Transitions only ever move forward: `Pending -> Processing ->
    /// terminal`. A pending job may also fail or be cancelled before the
    /// service accepted it, but can never complete or time out directly.
    pub fn predecessors(next: JobStatus) -> &'static [JobStatus] {
        match next {
            JobStatus::Pending => &[],
            JobStatus::Processing => &[JobStatus::Pending],
            JobStatus::Completed | JobStatus::TimedOut => &[JobStatus::Processing],
            JobStatus::Failed | JobStatus::Cancelled => {
                &[JobStatus::Pending, JobStatus::Processing]
            }
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        Self::predecessors(next).contains(&self)
    }
}

impl SceneStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SceneStatus::Pending | SceneStatus::Generating)
    }

    /// Map the terminal status of a scene's job onto the scene.
    pub fn from_job(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => SceneStatus::Pending,
            JobStatus::Processing => SceneStatus::Generating,
            JobStatus::Completed => SceneStatus::Completed,
            JobStatus::Failed | JobStatus::TimedOut => SceneStatus::Failed,
            JobStatus::Cancelled => SceneStatus::Cancelled,
        }
    }
}
