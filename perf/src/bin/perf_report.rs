//! Prints per-operation costs and cross-thread latency of the ring, then
//! saves everything as JSON under `perf/results/`.

use std::hint::black_box;
use std::mem::{align_of, size_of};
use std::sync::Barrier;
use std::time::Instant;

use serde::Serialize;
use zero_events::Tick;
use zero_mmap::MmapRegion;
use zero_perf::{
    LatencyStats, Measurement, Rusage, human_count, mono_now_ns, print_header, sample_tick,
    time_per_op,
};
use zero_ring::{HEADER_SIZE, RawRingBuffer, RingBuffer, WORD, storage_size};

const SLOTS: usize = 1 << 16;
const ROUNDS: usize = 2_000;
const PER_ROUND: usize = 1_000;
const TRANSFER_EVENTS: u64 = 2_000_000;

#[derive(Serialize)]
struct Transfer {
    events: u64,
    slots: usize,
    elapsed_ns: u64,
    full_spins: u64,
    latency: Option<LatencyStats>,
}

#[derive(Serialize)]
struct Report {
    word: usize,
    header_bytes: usize,
    tick_bytes: usize,
    single_thread: Vec<Measurement>,
    transfer: Transfer,
    rusage: Rusage,
}

fn tick_region(slots: usize) -> MmapRegion {
    match MmapRegion::anonymous(RingBuffer::<Tick>::storage_size(slots)) {
        Ok(region) => region,
        Err(e) => panic!("cannot map {slots}-slot ring: {e}"),
    }
}

fn print_layout() {
    println!("== layout ==");
    println!("  word {WORD} B, header {HEADER_SIZE} B");
    println!("  Tick {} B, align {}", size_of::<Tick>(), align_of::<Tick>());
    for slots in [4, 1024, SLOTS] {
        println!(
            "  {slots:>6} Tick slots -> {} B",
            RingBuffer::<Tick>::storage_size(slots)
        );
    }
}

fn single_thread() -> Vec<Measurement> {
    let mut region = tick_region(SLOTS);
    let Ok(mut ring) = RingBuffer::<Tick>::create_in(region.as_mut_slice(), SLOTS) else {
        panic!("anonymous map cannot host the ring");
    };
    let tick = sample_tick(1);
    let mut rows = Vec::new();

    rows.push(time_per_op("try_push + try_pop", ROUNDS, PER_ROUND, || {
        let _ = ring.try_push(black_box(tick));
        black_box(ring.try_pop());
    }));

    rows.push(time_per_op("stage/commit write + read", ROUNDS, PER_ROUND, || {
        if let Some(slot) = ring.stage_write() {
            // SAFETY: staged slots are sized and aligned for a Tick.
            unsafe { slot.write(black_box(tick)) };
            ring.commit_write();
        }
        if let Some(slot) = ring.stage_read() {
            // SAFETY: the slot was published just above.
            black_box(unsafe { slot.as_ref().seq });
            ring.commit_read();
        }
    }));

    rows.push(time_per_op("try_pop on empty", ROUNDS, PER_ROUND, || {
        black_box(ring.try_pop());
    }));

    rows.push(time_per_op("used()", ROUNDS, PER_ROUND, || {
        black_box(ring.used());
    }));

    let mut raw_region = match MmapRegion::anonymous(storage_size(64, 2)) {
        Ok(region) => region,
        Err(e) => panic!("cannot map raw ring: {e}"),
    };
    let Ok(raw) = RawRingBuffer::create_in(raw_region.as_mut_slice(), 64, 2) else {
        panic!("anonymous map cannot host the raw ring");
    };
    rows.push(time_per_op("raw commit pair, 64 B slot", ROUNDS, PER_ROUND, || {
        raw.commit_write();
        raw.commit_read();
    }));
    raw.destroy();

    print_header("single thread");
    rows.iter().for_each(Measurement::print_row);
    rows
}

/// The producer stamps every Tick with CLOCK_MONOTONIC; the consumer records
/// how long each one sat in the ring.
fn transfer() -> Transfer {
    let mut region = tick_region(SLOTS);
    let Ok(mut ring) = RingBuffer::<Tick>::create_in(region.as_mut_slice(), SLOTS) else {
        panic!("anonymous map cannot host the ring");
    };
    let Some((mut producer, mut consumer)) = ring.split() else {
        panic!("fresh ring has no halves");
    };
    let start_line = Barrier::new(2);
    let mut delays = Vec::with_capacity(TRANSFER_EVENTS as usize);

    let started = Instant::now();
    let full_spins = std::thread::scope(|s| {
        let start_line = &start_line;
        let writer = s.spawn(move || {
            start_line.wait();
            let mut spins = 0u64;
            for seq in 0..TRANSFER_EVENTS {
                let mut tick = Tick::new(seq, mono_now_ns());
                while let Err(back) = producer.try_push(tick) {
                    tick = back;
                    spins += 1;
                    std::hint::spin_loop();
                }
            }
            spins
        });

        start_line.wait();
        let mut next = 0u64;
        while next < TRANSFER_EVENTS {
            let Some(tick) = consumer.try_pop() else {
                std::hint::spin_loop();
                continue;
            };
            delays.push(mono_now_ns().saturating_sub(tick.ts_ns));
            assert_eq!(tick.seq, next, "ring reordered events");
            next += 1;
        }
        writer.join().unwrap_or_default()
    });
    let elapsed_ns = started.elapsed().as_nanos() as u64;

    let latency = LatencyStats::from_samples(&mut delays);
    print_header("cross thread, stamp to pop");
    if let Some(stats) = latency {
        Measurement {
            name: format!("{SLOTS} slots"),
            unit: "ns",
            stats,
        }
        .print_row();
    }
    let rate = TRANSFER_EVENTS as f64 * 1e9 / elapsed_ns.max(1) as f64;
    println!(
        "  {} events at {} ev/s, writer found the ring full {} times",
        human_count(TRANSFER_EVENTS),
        human_count(rate as u64),
        human_count(full_spins)
    );

    Transfer {
        events: TRANSFER_EVENTS,
        slots: SLOTS,
        elapsed_ns,
        full_spins,
        latency,
    }
}

fn save(report: &Report) {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/results");
    let stamp = std::process::Command::new("date")
        .arg("+%Y%m%d_%H%M%S")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".into());
    let path = format!("{dir}/{stamp}_ring.json");

    let written = std::fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|()| serde_json::to_string_pretty(report).map_err(|e| e.to_string()))
        .and_then(|body| std::fs::write(&path, body).map_err(|e| e.to_string()));
    match written {
        Ok(()) => println!("\nsaved {path}"),
        Err(e) => eprintln!("\ncould not save {path}: {e}"),
    }
}

fn main() {
    let before = Rusage::now();

    print_layout();
    let single_thread = single_thread();
    let transfer = transfer();

    let rusage = Rusage::now().since(&before);
    println!(
        "\n== process ==\n  peak RSS {} KiB, faults {} minor / {} major, \
         switches {} vol / {} invol",
        rusage.max_rss_kib,
        rusage.minor_faults,
        rusage.major_faults,
        rusage.voluntary_switches,
        rusage.involuntary_switches
    );

    save(&Report {
        word: WORD,
        header_bytes: HEADER_SIZE,
        tick_bytes: size_of::<Tick>(),
        single_thread,
        transfer,
        rusage,
    });
}
