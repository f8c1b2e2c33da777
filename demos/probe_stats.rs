use std::hash::Hasher;

use backshift_hash::AssocArray;
use backshift_hash::Description;
use clap::Parser;
use rand::TryRngCore;
use rand::rngs::OsRng;
use siphasher::sip::SipHasher;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "capacity", default_value_t = 1009)]
    capacity: usize,

    #[arg(short = 'n', long = "documents", default_value_t = 10_000)]
    documents: usize,
}

/// Registry slots keyed by document id; id 0 marks an empty slot.
#[derive(Clone, Copy)]
struct DocSlot {
    id: u64,
    offset: u64,
}

#[derive(Default)]
struct DocSlotDesc;

fn hash_id(id: u64) -> u32 {
    let mut hasher = SipHasher::new();
    hasher.write_u64(id);
    hasher.finish() as u32
}

impl Description for DocSlotDesc {
    type Key = u64;
    type Element = DocSlot;

    fn empty_element(&self) -> DocSlot {
        DocSlot { id: 0, offset: 0 }
    }

    fn is_empty_element(&self, element: &DocSlot) -> bool {
        element.id == 0
    }

    fn hash_key(&self, key: &u64) -> u32 {
        hash_id(*key)
    }

    fn hash_element(&self, element: &DocSlot) -> u32 {
        hash_id(element.id)
    }

    fn key_matches_element(&self, key: &u64, element: &DocSlot) -> bool {
        *key == element.id
    }

    fn element_matches_element(&self, left: &DocSlot, right: &DocSlot) -> bool {
        left.id == right.id
    }
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating associative array with initial capacity {}",
        args.capacity
    );

    let mut table: AssocArray<DocSlotDesc> = AssocArray::with_capacity(args.capacity);
    let mut rng = OsRng;

    let mut ids = Vec::with_capacity(args.documents);
    while ids.len() < args.documents {
        // Id 0 is the empty sentinel, so force the low bit on.
        let id = rng.try_next_u64().expect("os rng") | 1;
        let slot = DocSlot {
            id,
            offset: ids.len() as u64,
        };
        if table.add_element(slot, false) {
            ids.push(id);
        }
    }

    println!(
        "Inserted {} documents, capacity now {}",
        table.len(),
        table.capacity()
    );
    println!(
        "Load factor: {:.2}%",
        table.len() as f64 / table.capacity() as f64 * 100.0
    );

    let offset_total: u64 = ids
        .iter()
        .filter_map(|id| table.find_key(id))
        .map(|slot| slot.offset)
        .sum();
    assert_eq!(offset_total, (0..args.documents as u64).sum::<u64>());

    let mut misses = 0;
    for _ in 0..args.documents {
        let id = rng.try_next_u64().expect("os rng") | 1;
        if table.find_key(&id).is_none() {
            misses += 1;
        }
    }
    println!(
        "Probed {} random ids, {} not present",
        args.documents, misses
    );

    table.stats().print();
}
