#![no_main]

use libfuzzer_sys::fuzz_target;
use mockup_engine::engine::{ImageBuffer, ImagingPrimitives, RasterPrimitives};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let Ok(buffer) = ImageBuffer::from_encoded(data.to_vec()) else {
        return;
    };
    let _ = RasterPrimitives::new().decode(&buffer);
});
