use std::collections::HashMap;
use std::path::Path;

use actix_web::{test, web, App};
use diffusers_demo::generation::ImageGenerator;
use diffusers_demo::placeholder::{Placeholder, SIZE};
use diffusers_demo::ui::{configure, AppState, IMAGE_SOURCE_HEADER};
use image::{Rgb, RgbImage};

struct FixedGenerator;

impl ImageGenerator for FixedGenerator {
    fn generate(&self, prompt: &str) -> anyhow::Result<RgbImage> {
        if prompt.contains("broken") {
            anyhow::bail!("pipeline exploded")
        }
        Ok(RgbImage::from_pixel(40, 20, Rgb([10, 200, 10])))
    }
}

fn state(generator: Option<Box<dyn ImageGenerator + Send + Sync>>, dir: &Path) -> AppState {
    AppState::new(generator, Placeholder::bundled().unwrap(), dir.to_path_buf())
}

async fn post_prompt(state: AppState, prompt: &str) -> (String, RgbImage) {
    let app =
        test::init_service(App::new().app_data(web::Data::new(state)).configure(configure)).await;
    let form = HashMap::from([("prompt", prompt)]);
    let req = test::TestRequest::post().uri("/generate").set_form(&form).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");
    let source = resp.headers().get(IMAGE_SOURCE_HEADER).unwrap().to_str().unwrap().to_string();
    let body = test::read_body(resp).await;
    let image = image::load_from_memory(&body).unwrap().to_rgb8();
    (source, image)
}

#[actix_web::test]
async fn index_page_has_prompt_form() {
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new().app_data(web::Data::new(state(None, dir.path()))).configure(configure),
    )
    .await;
    let req = test::TestRequest::get().uri("/").to_request();
    let body = test::call_and_read_body(&app, req).await;
    let html = std::str::from_utf8(&body).unwrap();
    assert!(html.contains("name=\"prompt\""));
    assert!(html.contains("Generate"));
}

#[actix_web::test]
async fn generated_image_is_returned_and_saved() {
    let dir = tempfile::tempdir().unwrap();
    let (source, image) =
        post_prompt(state(Some(Box::new(FixedGenerator)), dir.path()), "A fantasy landscape").await;
    assert_eq!(source, "model");
    assert_eq!(image.dimensions(), (40, 20));
    assert!(dir.path().join("generated_output.png").is_file());
    assert!(!dir.path().join("output.png").exists());
}

#[actix_web::test]
async fn generator_error_falls_back_to_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let (source, image) =
        post_prompt(state(Some(Box::new(FixedGenerator)), dir.path()), "broken prompt").await;
    assert_eq!(source, "placeholder");
    assert_eq!(image.dimensions(), (SIZE, SIZE));
    assert_eq!(*image.get_pixel(SIZE - 1, SIZE - 1), Rgb([30, 30, 30]));
    assert!(dir.path().join("output.png").is_file());
}

#[actix_web::test]
async fn missing_generator_uses_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let (source, image) = post_prompt(state(None, dir.path()), "").await;
    assert_eq!(source, "placeholder");
    assert_eq!(image.dimensions(), (SIZE, SIZE));
    assert!(image.pixels().any(|p| *p != Rgb([30, 30, 30])));
}

#[actix_web::test]
async fn unsaved_model_image_falls_back_to_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    // A directory in place of the generated file makes writing it fail.
    std::fs::create_dir(dir.path().join("generated_output.png")).unwrap();
    let (source, image) =
        post_prompt(state(Some(Box::new(FixedGenerator)), dir.path()), "A fantasy landscape").await;
    assert_eq!(source, "placeholder");
    assert_eq!(image.dimensions(), (SIZE, SIZE));
    assert!(dir.path().join("output.png").is_file());
}
