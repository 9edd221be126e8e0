use std::env::Args;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use facealign::{Alignment, EyeLocator, FaceNormalizer, FacePipeline, ObjectDetector};

const ANNOTATED_FILE: &str = "annotated.png";
const ALIGNED_FILE: &str = "aligned.png";

fn main() {
    let options = match Options::parse(std::env::args()) {
        Ok(options) => options,
        Err(message) => {
            println!("Failed to parse program arguments: {}", message);
            std::process::exit(1)
        }
    };

    let pipeline = match build_pipeline(&options) {
        Ok(pipeline) => pipeline,
        Err(error) => {
            println!("Failed to load cascades: {}", error);
            std::process::exit(1)
        }
    };

    let image = match image::open(options.image_path()) {
        Ok(image) => image.to_rgba8(),
        Err(message) => {
            println!("Failed to read image: {}", message);
            std::process::exit(1)
        }
    };
    let (width, height) = image.dimensions();

    let now = Instant::now();
    let outcome = match pipeline.process_rgba(image.as_raw(), width, height) {
        Ok(outcome) => outcome,
        Err(error) => {
            println!("Pipeline failed: {}", error);
            std::process::exit(1)
        }
    };
    println!("Processed {}x{} in {} ms", width, height, get_millis(now.elapsed()));

    match outcome {
        Alignment::Aligned(aligned) => {
            let face = aligned.face();
            let eyes = aligned.eyes();
            println!(
                "Face at ({}, {}) {}x{}; eyes at ({}, {}) and ({}, {}); distance {:.1}px, angle {:.1} deg",
                face.x(),
                face.y(),
                face.width(),
                face.height(),
                eyes.left().x(),
                eyes.left().y(),
                eyes.right().x(),
                eyes.right().y(),
                aligned.distance(),
                aligned.angle().to_degrees(),
            );

            let mut annotated: RgbImage = image::DynamicImage::ImageRgba8(image).to_rgb8();
            draw_hollow_rect_mut(
                &mut annotated,
                Rect::at(face.x(), face.y()).of_size(face.width(), face.height()),
                Rgb([255, 0, 0]),
            );
            for eye in [eyes.left(), eyes.right()] {
                draw_cross_mut(&mut annotated, Rgb([0, 255, 0]), eye.x(), eye.y());
            }
            save_rgb(&annotated, ANNOTATED_FILE);

            let crop = aligned.crop();
            let side = crop.size();
            match image::GrayImage::from_raw(side, side, crop.data().to_vec()) {
                Some(gray) => match gray.save(ALIGNED_FILE) {
                    Ok(_) => println!("Saved aligned crop to {}", ALIGNED_FILE),
                    Err(message) => println!("Failed to save {}: {}", ALIGNED_FILE, message),
                },
                None => println!("Aligned crop buffer has unexpected size"),
            }
        }
        Alignment::NoFace => println!("No face found"),
        Alignment::NoEyes { face } => println!(
            "Face at ({}, {}) {}x{}, but no eyes found",
            face.x(),
            face.y(),
            face.width(),
            face.height()
        ),
    }
}

fn build_pipeline(options: &Options) -> facealign::Result<FacePipeline> {
    let face_cascade = facealign::load_cascade(options.face_cascade_path())?;
    let detector = ObjectDetector::with_options(
        face_cascade,
        facealign::DetectorOptions {
            edges_density: 0.2,
            ..Default::default()
        },
    )?;

    let eyes = match options.eye_cascade_path() {
        Some(path) => EyeLocator::with_cascade(facealign::load_cascade(path)?),
        None => EyeLocator::projection(),
    };

    Ok(FacePipeline::new(detector, eyes, FaceNormalizer::new()))
}

fn save_rgb(image: &RgbImage, path: &str) {
    match image.save(path) {
        Ok(_) => println!("Saved annotated image to {}", path),
        Err(message) => println!("Failed to save {}: {}", path, message),
    }
}

fn get_millis(duration: Duration) -> u64 {
    duration.as_secs() * 1000u64 + u64::from(duration.subsec_millis())
}

struct Options {
    face_cascade_path: String,
    eye_cascade_path: Option<String>,
    image_path: String,
}

impl Options {
    fn parse(args: Args) -> Result<Self, String> {
        let args: Vec<String> = args.collect();
        match args.len() {
            3 => Ok(Options {
                face_cascade_path: args[1].clone(),
                eye_cascade_path: None,
                image_path: args[2].clone(),
            }),
            4 => Ok(Options {
                face_cascade_path: args[1].clone(),
                eye_cascade_path: Some(args[2].clone()),
                image_path: args[3].clone(),
            }),
            _ => Err(format!(
                "Usage: {} <face-cascade> [<eye-cascade>] <image>",
                args[0]
            )),
        }
    }

    fn face_cascade_path(&self) -> &str {
        &self.face_cascade_path
    }

    fn eye_cascade_path(&self) -> Option<&str> {
        self.eye_cascade_path.as_deref()
    }

    fn image_path(&self) -> &str {
        &self.image_path
    }
}
