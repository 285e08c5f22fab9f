#![no_main]

use libfuzzer_sys::fuzz_target;
use wsbt::{PacketCodec, RollbackReader};

fuzz_target!(|data: &[u8]| {
    // Fuzz frame decoding - test for panics, crashes, oversized allocations
    let _ = PacketCodec::new().decode(&mut &data[..]);

    // Same bytes through a rollback reader with a sniffed prefix
    let mut reader = RollbackReader::new(data);
    let mut peek = [0u8; 6];
    if let Ok(n) = reader.read_into(&mut peek) {
        let _ = reader.rollback(n as isize);
        let _ = PacketCodec::new().decode(&mut reader);
    }
});
