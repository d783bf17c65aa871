use anyhow::{Context, bail};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zero_config::ZeroConfig;
use zero_events::Tick;
use zero_mmap::MmapRegion;
use zero_ring::{HEADER_SIZE, RawRingBuffer, RingBuffer};

/// Maps the ring file once the writer has created the ring in it.
fn wait_for_ring(config: &ZeroConfig) -> anyhow::Result<MmapRegion> {
    let path = &config.shm_file_path;
    let deadline = Instant::now() + Duration::from_millis(config.attach_timeout_ms);
    loop {
        if let Ok(mut region) = MmapRegion::open_rw(path) {
            if region.len() >= HEADER_SIZE {
                // SAFETY: the mapping is page-aligned and holds a whole header;
                // the view only reads the initialized flag.
                let view = unsafe { RawRingBuffer::attach(region.as_mut_ptr()) };
                if view.initialized() {
                    return Ok(region);
                }
            }
        }
        if Instant::now() >= deadline {
            bail!("no ring appeared at {path} within {}ms", config.attach_timeout_ms);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ZeroConfig::load(path).context("loading reader config")?,
        None => ZeroConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let mut region = wait_for_ring(&config)?;
    let mut ring = RingBuffer::<Tick>::attach_in(region.as_mut_slice())
        .with_context(|| format!("attaching to ring in {}", config.shm_file_path))?;
    info!(path = %config.shm_file_path, slots = ring.size(), "reader: attached");

    let start = Instant::now();
    let mut last = Instant::now();
    let mut count: u64 = 0;
    let mut received: u64 = 0;
    let mut next_seq: u64 = 0;
    let mut gaps: u64 = 0;
    let mut idle_since = Instant::now();

    while received < config.event_count {
        let Some(slot) = ring.stage_read() else {
            if !ring.initialized() {
                warn!(received, "reader: ring destroyed by writer");
                break;
            }
            if idle_since.elapsed() >= Duration::from_millis(config.attach_timeout_ms) {
                warn!(received, "reader: no events for too long, giving up");
                break;
            }
            std::hint::spin_loop();
            continue;
        };

        // SAFETY: the staged slot holds a Tick published by the writer and
        // stays ours until it is committed.
        let tick = unsafe { slot.as_ref() };
        if tick.seq != next_seq || !tick.is_intact() {
            gaps += 1;
        }
        next_seq = tick.seq + 1;
        ring.commit_read();

        received += 1;
        count += 1;
        idle_since = Instant::now();

        if last.elapsed() >= Duration::from_secs(1) {
            info!(rate = count, used = ring.used(), "reader: ev/s");
            count = 0;
            last = Instant::now();
        }
    }

    let elapsed = start.elapsed();
    let throughput = (received as f64 / elapsed.as_secs_f64()) as u64;
    info!(received, gaps, ?elapsed, throughput, "reader: done");
    if gaps > 0 {
        warn!(gaps, "reader: events arrived out of order or corrupted");
    }

    // The writer owns the ring; leave it in place.
    let _ = ring.into_raw();
    Ok(())
}
