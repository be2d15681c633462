use std::time::Duration;

use granary::TokenBucket;

fn main() {
    // starts empty, two tokens per second, capacity 10
    let bucket = TokenBucket::new(0.0, 10.0, 2.0);
    std::thread::sleep(Duration::from_secs(2));
    assert!(bucket.consume(3.0));
    println!("balance after consuming 3: {:.2}", bucket.count());
}
