//! Load-time validation of test definitions

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::TestCase;

/// Check required fields, default `operation_id` to the name and reject
/// duplicates. Must run before anything is scheduled.
pub fn validate_tests(tests: &mut [TestCase]) -> Result<()> {
    let mut names = HashSet::new();
    let mut operation_ids = HashSet::new();

    for (index, test) in tests.iter_mut().enumerate() {
        if test.name.trim().is_empty() {
            return Err(Error::MissingName { index });
        }
        if !names.insert(test.name.clone()) {
            return Err(Error::DuplicateName(test.name.clone()));
        }
        if test.endpoint.trim().is_empty() {
            return Err(Error::MissingEndpoint {
                name: test.name.clone(),
            });
        }
        if let Some(rps) = test.rps {
            if !rps.is_finite() || rps < 0.0 {
                return Err(Error::InvalidRps {
                    name: test.name.clone(),
                    value: rps,
                });
            }
        }

        if test.operation_id.trim().is_empty() {
            test.operation_id = test.name.clone();
        }
        if !operation_ids.insert(test.operation_id.clone()) {
            return Err(Error::DuplicateOperationId(test.operation_id.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_defaults_to_name() {
        let mut tests = vec![TestCase::new("List posts", "/posts")];
        validate_tests(&mut tests).unwrap();
        assert_eq!(tests[0].operation_id, "List posts");
    }

    #[test]
    fn test_duplicate_operation_id_after_defaulting() {
        let mut explicit = TestCase::new("Second", "/b");
        explicit.operation_id = "First".into();
        let mut tests = vec![TestCase::new("First", "/a"), explicit];

        let err = validate_tests(&mut tests).unwrap_err();
        assert!(matches!(err, Error::DuplicateOperationId(ref id) if id == "First"));
    }

    #[test]
    fn test_missing_fields() {
        let mut tests = vec![TestCase::new("", "/a")];
        assert!(matches!(
            validate_tests(&mut tests),
            Err(Error::MissingName { index: 0 })
        ));

        let mut tests = vec![TestCase::new("no endpoint", "")];
        assert!(matches!(
            validate_tests(&mut tests),
            Err(Error::MissingEndpoint { .. })
        ));
    }

    #[test]
    fn test_duplicate_name_and_bad_rps() {
        let mut tests = vec![TestCase::new("same", "/a"), TestCase::new("same", "/b")];
        assert!(matches!(validate_tests(&mut tests), Err(Error::DuplicateName(_))));

        let mut bad = TestCase::new("fast", "/a");
        bad.rps = Some(f64::INFINITY);
        assert!(matches!(
            validate_tests(&mut [bad]),
            Err(Error::InvalidRps { .. })
        ));
    }
}
