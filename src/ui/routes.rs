//! # Web server routes
//!
//! `GET /` serves the page, `POST /generate` takes a form field `prompt` and
//! answers with a png. The `x-image-source` response header tells whether the
//! image came from the model or is the placeholder.
use std::io::Cursor;
use std::path::PathBuf;

use actix_web::error::ErrorInternalServerError;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use serde::Deserialize;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::generation::ImageGenerator;
use crate::placeholder::Placeholder;
use crate::utils::ensure_dir;

pub const IMAGE_SOURCE_HEADER: &str = "x-image-source";
pub const GENERATED_FILE: &str = "generated_output.png";
pub const PLACEHOLDER_FILE: &str = "output.png";

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Model,
    Placeholder,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Placeholder => "placeholder",
        }
    }
}

pub struct Rendered {
    pub png: Vec<u8>,
    pub source: ImageSource,
    pub path: PathBuf,
}

pub struct AppState {
    generator: Option<Box<dyn ImageGenerator + Send + Sync>>,
    placeholder: Placeholder,
    output_dir: PathBuf,
}

impl AppState {
    pub fn new(
        generator: Option<Box<dyn ImageGenerator + Send + Sync>>,
        placeholder: Placeholder,
        output_dir: PathBuf,
    ) -> Self {
        Self { generator, placeholder, output_dir }
    }

    pub fn from_config(
        config: &Config,
        generator: Option<Box<dyn ImageGenerator + Send + Sync>>,
    ) -> Result<Self> {
        let placeholder = Placeholder::load(config.font_file.as_deref())?;
        Ok(Self::new(generator, placeholder, config.output_dir.clone()))
    }

    /// Runs the generator, falling back to the placeholder when generating or
    /// saving the model image fails. The result is written to the output
    /// directory as well.
    pub fn render(&self, prompt: &str) -> Result<Rendered> {
        if let Some(generator) = &self.generator {
            let rendered = generator
                .generate(prompt)
                .and_then(|image| Ok(self.store(&image, GENERATED_FILE, ImageSource::Model)?));
            match rendered {
                Ok(rendered) => return Ok(rendered),
                Err(err) => error!("Error calling generator: {err:#}"),
            }
        }
        let image = self.placeholder.render(prompt);
        self.store(&image, PLACEHOLDER_FILE, ImageSource::Placeholder)
    }

    fn store(&self, image: &RgbImage, filename: &str, source: ImageSource) -> Result<Rendered> {
        ensure_dir(&self.output_dir)?;
        let path = self.output_dir.join(filename);
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .map_err(|source| Error::Image { path: path.clone(), source })?;
        std::fs::write(&path, &png).map_err(|e| Error::io(&path, e))?;
        Ok(Rendered { png, source, path })
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateForm {
    pub prompt: String,
}

pub async fn index() -> impl Responder {
    HttpResponse::Ok().content_type("text/html; charset=utf-8").body(INDEX_HTML)
}

pub async fn generate(
    state: web::Data<AppState>,
    form: web::Form<GenerateForm>,
) -> actix_web::Result<HttpResponse> {
    let prompt = form.into_inner().prompt;
    let rendered = web::block(move || state.render(&prompt))
        .await?
        .map_err(ErrorInternalServerError)?;
    info!("Serving {} image {}", rendered.source.as_str(), rendered.path.display());
    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .insert_header((IMAGE_SOURCE_HEADER, rendered.source.as_str()))
        .body(rendered.png))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index)).route("/generate", web::post().to(generate));
}

pub async fn run_server(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(state);
    info!("Starting server at http://{host}:{port}/");
    HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind((host, port))?
        .run()
        .await
}
