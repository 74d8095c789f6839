//! We capture a snapshot of the current hardware and write a human-readable description of it
//! to the terminal: the processor identification, every physical core with its logical cores,
//! the cache sizes and the supported instruction set extensions.

use cpu_snapshot::build_snapshot;
use itertools::Itertools;

fn main() {
    let snapshot = match build_snapshot() {
        Ok(snapshot) => snapshot,
        Err(error) => {
            eprintln!("failed to capture snapshot (status {}): {error}", error.status_code());
            return;
        }
    };

    println!("Vendor: {}", snapshot.vendor());
    println!("Brand: {}", snapshot.brand());
    println!(
        "{} logical cores in {} physical cores",
        snapshot.logical_core_count(),
        snapshot.physical_core_count()
    );

    for core in snapshot.physical_cores() {
        println!(
            "  physical core {:#x} ({}): logical cores {}",
            core.id(),
            core.class(),
            core.logical_core_indices().iter().join(", ")
        );
    }

    let per_core = snapshot
        .l1_kib()
        .iter()
        .zip(snapshot.l2())
        .zip(snapshot.frequency_mhz());

    for (index, ((l1_kib, l2), mhz)) in per_core.enumerate() {
        println!(
            "  logical core {index}: L1 {l1_kib} KiB, L2 {} KiB shared by {}, {mhz} MHz",
            l2.size_kib, l2.shared_with_core_number
        );
    }

    println!("L3: {} KiB", snapshot.l3_kib());
    println!("Features: {}", snapshot.features().iter().join(" "));
}
