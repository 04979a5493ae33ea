use image::ImageReader;
use markgrid::{OmrEngine, Outcome, PixelBuffer};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!(
            "Usage: {} <sheet.png> <template_id> <A,B,C,...> [out.json]",
            args[0]
        );
        std::process::exit(2);
    }

    let image = ImageReader::open(&args[1])?.decode()?.to_rgb8();
    let key: Vec<String> = args[3].split(',').map(|s| s.trim().to_string()).collect();

    let engine = OmrEngine::new();
    let outcome = engine.process(PixelBuffer::from(&image), &key, &args[2], None);

    match &outcome {
        Outcome::Success(r) => println!(
            "Scored {}/{} ({:.1}%) in {:.2}s.",
            r.score, r.total_questions, r.percentage, r.processing_time
        ),
        Outcome::Failure(e) => println!("Failed: {} ({:?})", e.error, e.error_code),
    }

    if let Some(out_path) = args.get(4) {
        let json = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(out_path, json)?;
        println!("Wrote {out_path}");
    }
    Ok(())
}
