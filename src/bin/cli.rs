//! CLI application for turning a face segmentation into SVG contours.
//!
//! Usage:
//!   face-contour <image> <labels> --landmarks lm.json               # Summary, SVG to stdout
//!   face-contour <image> <labels> --landmarks lm.json -o face.svg   # Save the SVG
//!   face-contour <image> <labels> --landmarks lm.json --json        # API response JSON

use clap::Parser;
use face_contour::{decode, BoundingBox, LandmarkSet, Pipeline, PipelineConfig, PipelineOutput, RetryPolicy};
use image::{GrayImage, RgbaImage};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "face-contour")]
#[command(author, version, about = "Align a face and vectorize its segmentation", long_about = None)]
struct Args {
    /// Input photograph
    #[arg(required = true)]
    image: PathBuf,

    /// Segmentation label map, one label value per pixel
    #[arg(required = true)]
    labels: PathBuf,

    /// Landmarks as a JSON array of {"x", "y"} objects
    #[arg(long)]
    landmarks: PathBuf,

    /// Pipeline configuration (JSON); defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the SVG document here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the base64 SVG and contour arrays as JSON
    #[arg(short, long)]
    json: bool,

    /// Attempts for decoding the inputs
    #[arg(long, default_value = "1")]
    retries: u32,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => {
            log::info!("Loading config from {:?}", path);
            PipelineConfig::from_json_file(path)?
        }
        None => PipelineConfig::default(),
    };
    let pipeline = Pipeline::new(config)?;

    let (image, labels, landmarks) = load_inputs(args)?;
    log::info!(
        "Loaded {}x{} image with {} landmarks",
        image.width(),
        image.height(),
        landmarks.num_landmarks()
    );

    let output = pipeline.process(image, landmarks, labels)?;

    if let Some(ref path) = args.output {
        std::fs::write(path, output.document.as_bytes())?;
        log::info!("SVG written to {:?}", path);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output.to_response())?);
    } else if args.output.is_some() {
        print!("{}", format_human_readable(&output));
    } else {
        print!("{}", output.document);
    }

    Ok(())
}

fn load_inputs(args: &Args) -> face_contour::Result<(RgbaImage, GrayImage, LandmarkSet)> {
    let policy = RetryPolicy::default().with_max_attempts(args.retries);
    let image = policy.run(|_| decode::read_image_file(&args.image))?;
    let labels = policy.run(|_| decode::read_label_map_file(&args.labels))?;
    let landmarks = decode::read_landmarks_file(&args.landmarks)?;
    Ok((image, labels, landmarks))
}

fn format_human_readable(output: &PipelineOutput) -> String {
    let mut s = String::new();
    let doc = &output.document;

    s.push_str(&format!("Canvas: {}x{}\n", doc.width(), doc.height()));
    if output.alignment.is_rotated() {
        s.push_str(&format!("Rotated: {:.2}° to level the eyes\n", output.alignment.angle));
    } else {
        s.push_str("Rotated: no\n");
    }

    if output.regions.is_empty() {
        s.push_str("\nNo labelled regions found.\n");
        return s;
    }

    s.push_str("\nRegions:\n");
    for (label, contours) in &output.regions {
        let holes = contours.iter().filter(|c| c.is_hole()).count();
        let vertices: usize = contours.iter().map(|c| c.len()).sum();
        s.push_str(&format!(
            "  {:>3}: {} path(s), {} hole(s), {} vertices",
            label,
            doc.paths_for(*label).count(),
            holes,
            vertices
        ));
        let extent = contours
            .iter()
            .filter(|c| !c.is_hole())
            .map(|c| c.bounding_box())
            .reduce(|a, b| {
                let (x, y) = (a.x.min(b.x), a.y.min(b.y));
                BoundingBox::new(x, y, a.right().max(b.right()) - x, a.bottom().max(b.bottom()) - y)
            });
        if let Some(bbox) = extent {
            s.push_str(&format!(
                ", extent ({:.1}, {:.1})-({:.1}, {:.1})",
                bbox.x,
                bbox.y,
                bbox.right(),
                bbox.bottom()
            ));
        }
        s.push('\n');
    }

    s
}
