//! Re-creating a ring with a different geometry must kill the process.
//!
//! An abort cannot be observed from inside the test that triggers it, so each
//! test re-invokes the test binary with a role in the environment and checks
//! how the child exited.

use std::env;
use std::process::{Command, ExitStatus, Stdio};
use zero_mmap::MmapRegion;
use zero_ring::{RawRingBuffer, RingBuffer, storage_size};

const ENV_ROLE: &str = "ZERO_MISMATCH_ROLE";

/// Runs `test_name` in a child process with `role` set, returning its status.
fn run_child(test_name: &str, role: &str) -> ExitStatus {
    let exe = env::current_exe().expect("Failed to get current executable path");
    Command::new(exe)
        .arg("--exact")
        .arg(test_name)
        .arg("--nocapture")
        .env(ENV_ROLE, role)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("Failed to run child process")
}

fn assert_aborted(status: ExitStatus) {
    assert!(!status.success(), "child survived a layout mismatch: {status}");
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(libc::SIGABRT), "child status: {status}");
    }
}

/// Creates a ring of 4 slots of 8 bytes, then re-creates it as requested.
fn recreate(slot_size: usize, slot_count: usize) {
    let mut region = MmapRegion::anonymous(storage_size(16, 16)).expect("anonymous map");
    let first = RawRingBuffer::create_in(region.as_mut_slice(), 8, 4).expect("first create");
    assert!(first.commit_write());
    drop(first);

    let again = RawRingBuffer::create_in(region.as_mut_slice(), slot_size, slot_count)
        .expect("second create");
    // Only reachable when the geometry matched.
    assert_eq!((again.head(), again.tail()), (2, 0));
}

#[test]
fn recreate_with_other_slot_size_aborts() {
    if let Ok(role) = env::var(ENV_ROLE) {
        if role == "slot_size" {
            recreate(16, 4);
        }
        return;
    }
    assert_aborted(run_child("recreate_with_other_slot_size_aborts", "slot_size"));
}

#[test]
fn recreate_with_other_slot_count_aborts() {
    if let Ok(role) = env::var(ENV_ROLE) {
        if role == "slot_count" {
            recreate(8, 8);
        }
        return;
    }
    assert_aborted(run_child("recreate_with_other_slot_count_aborts", "slot_count"));
}

#[test]
fn typed_recreate_with_other_element_aborts() {
    if let Ok(role) = env::var(ENV_ROLE) {
        if role == "typed" {
            let mut region =
                MmapRegion::anonymous(RingBuffer::<u64>::storage_size(8)).expect("anonymous map");
            let ptr = region.as_mut_ptr();
            // SAFETY: the mapping is page-aligned, zeroed, and sized for both rings.
            let first = unsafe { RingBuffer::<u64>::create(ptr, 8) };
            let _ = first.into_raw();
            // SAFETY: as above.
            let _second = unsafe { RingBuffer::<u32>::create(ptr, 8) };
        }
        return;
    }
    assert_aborted(run_child("typed_recreate_with_other_element_aborts", "typed"));
}

#[test]
fn recreate_with_same_geometry_survives() {
    if let Ok(role) = env::var(ENV_ROLE) {
        if role == "same" {
            recreate(8, 4);
        }
        return;
    }
    let status = run_child("recreate_with_same_geometry_survives", "same");
    assert!(status.success(), "child status: {status}");
}
