use config::shared::IgnoreErrorsPolicy;

use crate::error::{ErrorCategory, SinkError};

/// Stage at which a record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The record could not be decoded, mapped or converted, so no statement reached the
    /// database.
    Mapping,
    /// The database rejected a statement or did not answer in time.
    Execution,
}

impl FailureKind {
    /// Classifies the failure of a record.
    ///
    /// A record counts as an execution failure only when every error it collected comes from
    /// statement execution.
    pub fn of(error: &SinkError) -> Self {
        match error.category() {
            ErrorCategory::Execution => FailureKind::Execution,
            _ => FailureKind::Mapping,
        }
    }
}

/// What happens to a failed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The record is acknowledged as processed and the failure is only logged and counted.
    Ignore,
    /// The record is reported failed to the transport.
    Fail,
}

/// Decides the disposition of a failed record under an error tolerance policy.
pub fn disposition(policy: IgnoreErrorsPolicy, kind: FailureKind) -> Disposition {
    match (policy, kind) {
        (IgnoreErrorsPolicy::All, _) => Disposition::Ignore,
        (IgnoreErrorsPolicy::Driver, FailureKind::Execution) => Disposition::Ignore,
        (IgnoreErrorsPolicy::Driver, FailureKind::Mapping) | (IgnoreErrorsPolicy::None, _) => {
            Disposition::Fail
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sink_error;

    #[test]
    fn policies_tolerate_their_failure_kinds() {
        use Disposition::*;
        use FailureKind::*;

        for (policy, mapping, execution) in [
            (IgnoreErrorsPolicy::None, Fail, Fail),
            (IgnoreErrorsPolicy::All, Ignore, Ignore),
            (IgnoreErrorsPolicy::Driver, Fail, Ignore),
        ] {
            assert_eq!(disposition(policy, Mapping), mapping, "{policy:?}");
            assert_eq!(disposition(policy, Execution), execution, "{policy:?}");
        }
    }

    #[test]
    fn any_non_execution_error_makes_a_mapping_failure() {
        let timeout = sink_error!(ErrorKind::DestinationTimeout, "Statement timed out");
        let missing = sink_error!(ErrorKind::MissingField, "Missing record field");

        assert_eq!(FailureKind::of(&timeout), FailureKind::Execution);
        assert_eq!(
            FailureKind::of(&vec![timeout.clone(), timeout.clone()].into()),
            FailureKind::Execution
        );
        assert_eq!(
            FailureKind::of(&vec![timeout, missing].into()),
            FailureKind::Mapping
        );
    }
}
