//! Interactive driver: a background thread slowly drains a bucket while
//! stdin commands consume and restore tokens by hand.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use granary::{BucketRegistry, BucketSnapshot, RegistryConfig};

const TEST_CATEGORY: u32 = 5;
const TEST_BUCKET: u32 = 15;

fn main() {
    // reset the bucket whenever it is exhausted
    let registry = Arc::new(BucketRegistry::with_config(
        RegistryConfig::new().with_reset_when_consumed(true),
    ));
    registry.create_bucket_in(
        TEST_CATEGORY,
        TEST_BUCKET,
        5.0,
        10.0,
        1.0,
        Some(Arc::new(|_: &BucketSnapshot| println!("ALERT CALLED!"))),
    );

    let running = Arc::new(AtomicBool::new(true));
    let drain = {
        let registry = Arc::clone(&registry);
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                registry.consume_in(TEST_CATEGORY, TEST_BUCKET, 0.1);
                std::thread::sleep(Duration::from_secs(1));
                let bucket = registry.get_bucket_in(TEST_CATEGORY, TEST_BUCKET);
                println!("Tokens: {:.2}", bucket.count());
                println!("Total Consumed: {:.2}", bucket.total_consumed());
            }
        })
    };

    println!("-------------------------");
    println!("Type z to consume a token.");
    println!("Type x to restore a token.");
    println!("Type q to quit.");
    println!("-------------------------");

    for line in std::io::stdin().lock().lines() {
        match line.unwrap_or_default().trim() {
            "z" => {
                registry.consume_in(TEST_CATEGORY, TEST_BUCKET, 1.0);
            }
            "x" => {
                registry.restore_in(TEST_CATEGORY, TEST_BUCKET, 1.0);
            }
            "q" => break,
            _ => {}
        }
    }

    running.store(false, Ordering::Relaxed);
    drain.join().unwrap();
}
