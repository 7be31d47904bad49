#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use image::{self, RgbaImage};
use libfuzzer_sys::fuzz_target;
use mockup_engine::render_for_fuzzing;

#[derive(Arbitrary, Debug)]
struct ImageSeed {
    width: u8,
    height: u8,
    pixel: [u8; 4],
}

fn build_png(seed: &ImageSeed) -> Vec<u8> {
    let width = seed.width as u32 % 48 + 1;
    let height = seed.height as u32 % 48 + 1;
    let img = RgbaImage::from_pixel(width, height, image::Rgba(seed.pixel));
    let mut buf = Vec::new();
    let _ = image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png);
    buf
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let seeds: [ImageSeed; 3] = match Arbitrary::arbitrary(&mut unstructured) {
        Ok(v) => v,
        Err(_) => return,
    };

    // Either raw fuzz bytes or a synthesized PNG for each input.
    let rest = unstructured.take_rest();
    let artwork = if rest.len() > 16 {
        rest.to_vec()
    } else {
        build_png(&seeds[2])
    };
    // Fuzzing: the render may fail on odd inputs; we're interested only in
    // panics or memory issues.
    let _ = render_for_fuzzing(&build_png(&seeds[0]), &build_png(&seeds[1]), &artwork);
});
