//! End-to-end two-process test for the SPSC ring over a memory-mapped file.
//!
//! # Overview
//!
//! The test binary re-invokes itself twice with a role in the environment:
//! one child creates the ring and writes, the other attaches and reads. Both
//! run at the same time, so every transfer crosses a process boundary while
//! the peer is active.
//!
//! ```text
//! [Writer]  --[create_rw + create]--[push push push ... wait for drain]--[exit]
//!                    |                   |    |    |
//!                    v                   v    v    v
//!               [mmap file]          (concurrent stage/commit)
//!                    ^                   ^    ^    ^
//!                    |                   |    |    |
//! [Reader]  -----[open_rw + attach]-----[pop pop pop ... until count]----[exit]
//! ```
//!
//! Unlike a broadcast bus, an SPSC ring never drops: the reader must receive
//! every event exactly once and in order.
//!
//! # Running the Test
//!
//! ```bash
//! cargo test -p zero-ring --test e2e_mmap -- --nocapture
//! ```

use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use zero_events::Tick;
use zero_mmap::MmapRegion;
use zero_ring::{HEADER_SIZE, RawRingBuffer, RingBuffer};

/// Writes to stderr with immediate flush to bypass test output capture.
macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "ZERO_E2E_ROLE";
const ENV_PATH: &str = "ZERO_E2E_PATH";
const ROLE_WRITER: &str = "writer";
const ROLE_READER: &str = "reader";

const EVENT_COUNT: u64 = 200_000;

/// Small on purpose, so the writer regularly finds the ring full.
const SLOT_COUNT: usize = 1 << 10;

fn test_path() -> String {
    let pid = std::process::id();
    format!("/tmp/zero_e2e_ring_{pid}")
}

fn run_writer(path: &str) {
    log!("[WRITER] Creating ring at {path} ({SLOT_COUNT} slots)");

    let bytes = RingBuffer::<Tick>::storage_size(SLOT_COUNT);
    let mut region =
        MmapRegion::create_rw(path, bytes as u64).expect("writer: failed to map ring file");
    let mut ring = RingBuffer::<Tick>::create_in(region.as_mut_slice(), SLOT_COUNT)
        .expect("writer: region cannot host the ring");

    let start = Instant::now();
    let mut full_spins: u64 = 0;
    for seq in 0..EVENT_COUNT {
        let mut tick = Tick::new(seq, start.elapsed().as_nanos() as u64);
        loop {
            match ring.try_push(tick) {
                Ok(()) => break,
                Err(back) => {
                    tick = back;
                    full_spins += 1;
                    std::hint::spin_loop();
                }
            }
        }
    }
    log!(
        "[WRITER] Published {EVENT_COUNT} events in {:?} ({full_spins} full spins)",
        start.elapsed()
    );

    // Destroying the ring under a live reader is not allowed: wait for it to
    // drain everything first.
    let drain_deadline = Instant::now() + Duration::from_secs(10);
    while !ring.empty() {
        assert!(Instant::now() < drain_deadline, "writer: reader never drained the ring");
        std::thread::sleep(Duration::from_micros(50));
    }
    log!("[WRITER] Ring drained, destroying");
}

fn run_reader(path: &str) {
    log!("[READER] Waiting for ring at {path}");

    let open_deadline = Instant::now() + Duration::from_secs(5);
    let mut region = loop {
        match MmapRegion::open_rw(path) {
            Ok(r) if r.len() >= HEADER_SIZE => {
                let mut r = r;
                // SAFETY: the mapping is word-aligned and holds a full header;
                // only the initialized flag is read.
                let view = unsafe { RawRingBuffer::attach(r.as_mut_ptr()) };
                if view.initialized() {
                    break r;
                }
            }
            Ok(_) | Err(_) => {}
        }
        assert!(Instant::now() < open_deadline, "reader: ring never appeared");
        std::thread::sleep(Duration::from_millis(1));
    };

    let mut ring =
        RingBuffer::<Tick>::attach_in(region.as_mut_slice()).expect("reader: bad ring region");
    log!("[READER] Attached, {} usable slots", ring.size());

    let read_deadline = Instant::now() + Duration::from_secs(20);
    let mut expected: u64 = 0;
    while expected < EVENT_COUNT {
        match ring.try_pop() {
            Some(tick) => {
                assert_eq!(tick.seq, expected, "reader: out of order event");
                assert!(tick.is_intact(), "reader: torn event {tick:?}");
                expected += 1;
            }
            None => {
                assert!(Instant::now() < read_deadline, "reader: stalled at {expected}");
                std::hint::spin_loop();
            }
        }
    }
    log!("[READER] Received all {EVENT_COUNT} events in order");

    // The writer owns the ring's lifetime.
    let _ = ring.into_raw();
}

#[test]
fn e2e_two_process_spsc_ring() {
    if let Ok(role) = env::var(ENV_ROLE) {
        let path = env::var(ENV_PATH).expect("ZERO_E2E_PATH not set");
        match role.as_str() {
            ROLE_WRITER => run_writer(&path),
            ROLE_READER => run_reader(&path),
            other => panic!("Unknown role: {other}"),
        }
        return;
    }

    let path = test_path();
    let _ = std::fs::remove_file(&path);
    let exe = env::current_exe().expect("Failed to get current executable path");

    let spawn = |role: &str| {
        Command::new(&exe)
            .arg("--exact")
            .arg("e2e_two_process_spsc_ring")
            .arg("--nocapture")
            .env(ENV_ROLE, role)
            .env(ENV_PATH, &path)
            .stderr(Stdio::inherit())
            .spawn()
            .expect("Failed to spawn child process")
    };

    log!("[ORCHESTRATOR] Spawning writer and reader");
    let mut writer_proc = spawn(ROLE_WRITER);
    std::thread::sleep(Duration::from_millis(5));
    let mut reader_proc = spawn(ROLE_READER);

    let writer_status = writer_proc.wait().expect("Failed to wait for writer");
    let reader_status = reader_proc.wait().expect("Failed to wait for reader");

    let _ = std::fs::remove_file(&path);

    assert!(
        writer_status.success(),
        "Writer process failed with status: {writer_status}"
    );
    assert!(
        reader_status.success(),
        "Reader process failed with status: {reader_status}"
    );
}
