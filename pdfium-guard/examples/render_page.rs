//! Render every page of a PDF to PNG and print its text.
//!
//! Usage: cargo run --example render_page <pdf_path> [output_dir] [scale]
//!
//! Set `PDFIUM_LIB_DIR` to the directory holding the PDFium shared
//! library, and `RUST_LOG=pdfium_guard=debug` to watch handle lifetimes.

use pdfium_guard::{
    DocumentSession, FormConfig, PixelFormat, RenderFlags, RenderTarget, Runtime, Transform,
};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <pdf_path> [output_dir] [scale]", args[0]);
        std::process::exit(1);
    }
    let pdf_path = &args[1];
    let output_dir = PathBuf::from(
        args.get(2)
            .map(|s| s.as_str())
            .unwrap_or("/tmp/pdfium-guard-render"),
    );
    let scale: f32 = match args.get(3) {
        Some(s) => s.parse()?,
        None => 2.0,
    };
    std::fs::create_dir_all(&output_dir)?;

    let runtime = Runtime::acquire()?;
    let doc = DocumentSession::open_from_file(&runtime, pdf_path, None)?;
    println!("Opened {}: {} pages, {:?}", pdf_path, doc.page_count(), doc.version()?);

    let _form = doc.attach_form_environment(FormConfig::default())?;
    let flags = RenderFlags::ANNOTATIONS | RenderFlags::LCD_TEXT | RenderFlags::FORMS;

    for index in 0..doc.page_count() {
        let page = doc.load_page(index)?;
        let size = page.size()?;
        let width = (size.width * scale).round().max(1.0) as u32;
        let height = (size.height * scale).round().max(1.0) as u32;

        let target = RenderTarget::new(&runtime, width, height, PixelFormat::Bgra)?;
        target.clear(pdfium_guard::Color::WHITE)?;
        page.render(&target, &Transform::fit(size, width, height), flags)?;

        let path = output_dir.join(format!("page_{:04}.png", index + 1));
        target.save_as_png(&path)?;

        let text = page.text()?;
        println!(
            "Page {}: {}x{} -> {} ({} chars of text)",
            index + 1,
            width,
            height,
            path.display(),
            text.chars().count()
        );
    }

    doc.close()?;
    Ok(())
}
