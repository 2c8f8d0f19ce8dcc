//! Tests for error classification and messages

use std::io;

use kestrel_core::error::{KestrelError, Result};

#[test]
fn test_from_io_classifies_kind()
{
    let not_found = KestrelError::from_io("/var/crash/core", io::Error::from(io::ErrorKind::NotFound));
    assert!(matches!(not_found, KestrelError::TargetNotFound(ref what) if what.starts_with("/var/crash/core")));

    let denied = KestrelError::from_io("/proc/kcore", io::Error::from(io::ErrorKind::PermissionDenied));
    assert!(matches!(denied, KestrelError::PermissionDenied(ref what) if what.contains("/proc/kcore")));

    let other = KestrelError::from_io("/dev/sda", io::Error::from(io::ErrorKind::Interrupted));
    assert!(matches!(other, KestrelError::Io(_)));
}

#[test]
fn test_messages()
{
    assert_eq!(KestrelError::ProcessNotFound(42).to_string(), "Process not found: PID 42");
    assert_eq!(
        KestrelError::Fault { address: 0xdead_0000 }.to_string(),
        "Address not mapped: 0xdead0000"
    );
    assert_eq!(
        KestrelError::MalformedTarget("bad note".to_string()).to_string(),
        "Malformed target: bad note"
    );
}

#[test]
fn test_is_malformed()
{
    assert!(KestrelError::MalformedTarget(String::new()).is_malformed());
    assert!(!KestrelError::Fault { address: 0 }.is_malformed());
    assert!(!KestrelError::AttachFailed(String::new()).is_malformed());
}

#[test]
fn test_reserve_failure_is_allocation_failure()
{
    let err = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
    assert!(matches!(KestrelError::from(err), KestrelError::AllocationFailed(_)));
}

#[test]
fn test_question_mark_converts_io()
{
    fn fails() -> Result<()>
    {
        let _: () = Err(io::Error::new(io::ErrorKind::Other, "boom"))?;
        Ok(())
    }
    assert!(matches!(fails(), Err(KestrelError::Io(_))));
}
