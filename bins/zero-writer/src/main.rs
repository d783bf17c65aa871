use anyhow::Context;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zero_config::ZeroConfig;
use zero_events::Tick;
use zero_mmap::MmapRegion;
use zero_ring::RingBuffer;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ZeroConfig::load(path).context("loading writer config")?,
        None => ZeroConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let path = &config.shm_file_path;
    let bytes = RingBuffer::<Tick>::storage_size(config.slot_count);
    let mut region = MmapRegion::create_rw(path, bytes as u64)
        .with_context(|| format!("mapping {path} ({bytes} bytes)"))?;
    let mut ring = RingBuffer::<Tick>::create_in(region.as_mut_slice(), config.slot_count)
        .with_context(|| format!("creating ring in {path}"))?;

    info!(
        path = %path,
        slot_count = config.slot_count,
        events = config.event_count,
        "writer: publishing Tick"
    );

    let clock = Instant::now();
    let mut last = Instant::now();
    let mut count: u64 = 0;
    let mut full_spins: u64 = 0;

    for seq in 0..config.event_count {
        loop {
            let Some(slot) = ring.stage_write() else {
                full_spins += 1;
                std::hint::spin_loop();
                continue;
            };
            // SAFETY: the staged slot is aligned and sized for a Tick and is
            // ours until it is committed.
            unsafe { slot.write(Tick::new(seq, clock.elapsed().as_nanos() as u64)) };
            ring.commit_write();
            break;
        }
        count += 1;

        if last.elapsed() >= Duration::from_secs(1) {
            info!(rate = count, full_spins, used = ring.used(), "writer: ev/s");
            count = 0;
            full_spins = 0;
            last = Instant::now();
        }
    }

    info!(elapsed = ?clock.elapsed(), "writer: all events published, waiting for reader to drain");

    let deadline = Instant::now() + Duration::from_millis(config.attach_timeout_ms);
    while !ring.empty() {
        if Instant::now() >= deadline {
            warn!(left = ring.used(), "writer: reader did not drain the ring, tearing down anyway");
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    drop(ring);
    info!("writer: ring destroyed");
    Ok(())
}
