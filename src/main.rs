#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod embed;
mod font;
mod layout;
mod parse;
mod probe;
mod render;
mod scan;
mod sort;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use font::TitleFont;
use layout::{Book, Canvas, DEFAULT_PADDING};
use parse::PageSize;

#[derive(Parser)]
#[command(
    name = "mkbook",
    version,
    about = "Make directory including pictures into a PDF book",
    after_help = "note:\n    Mainly made for books downloaded by manga downloaders: one\n    sub-directory per chapter, one picture per page."
)]
struct Cli {
    /// target dir
    #[arg(value_name = "TARGET_DIR", value_parser = parse::existing_dir, required_unless_present = "completions")]
    target_dir: Option<PathBuf>,

    /// saved pdf file path
    #[arg(value_name = "SAVE_PATH", value_parser = parse::save_path, required_unless_present = "completions")]
    save_path: Option<PathBuf>,

    /// font size of page headers and numbers (titles use 3x)
    #[arg(short, long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    font_size: u32,

    /// truetype/opentype font file for all text
    ///
    /// The whole font file is embedded, so a CJK font adds several MB to the
    /// book. Without this option, ASCII-only titles use the built-in
    /// Helvetica and other titles use the first Japanese-capable system font
    /// found, or Helvetica with '?' for the missing characters.
    #[arg(short = 'F', long, value_parser = parse::existing_file)]
    tt_font: Option<PathBuf>,

    /// overwrite if pdf path exists
    #[arg(short, long)]
    overwrite: bool,

    /// smallest page size, grown to fit the largest picture
    #[arg(long, value_enum, default_value = "a4")]
    min_size: PageSize,

    /// points added to the largest picture's width and height
    #[arg(long, default_value_t = DEFAULT_PADDING)]
    padding: f32,

    /// PDF title metadata (default: name of the target dir)
    #[arg(long)]
    title: Option<String>,

    /// PDF author metadata
    #[arg(long)]
    author: Option<String>,

    /// num parallel threads (default number of CPUs)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// more log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// generate shell completions and exit
    #[arg(long, value_name = "SHELL", exclusive = true)]
    completions: Option<clap_complete::Shell>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(shell) = cli.completions {
        clap_complete::generate(shell, &mut Cli::command(), "mkbook", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    // both are required unless --completions, which returned above
    let (Some(target_dir), Some(save_path)) = (cli.target_dir.as_deref(), cli.save_path.as_deref())
    else {
        anyhow::bail!("TARGET_DIR and SAVE_PATH are required");
    };

    if save_path.exists() && !cli.overwrite {
        eprintln!(
            "{} already exists. Use `-o` to overwrite.",
            absolute(save_path).display()
        );
        return Ok(ExitCode::from(2));
    }

    let folders = scan::scan_tree(target_dir)?;
    let paths: Vec<PathBuf> = folders.iter().flat_map(|f| f.images.iter().cloned()).collect();
    let dims = probe::probe_dimensions(&paths)?;
    let name = scan::dir_name(target_dir);
    let book = Book::assemble(name.clone(), folders, &dims);

    let texts: Vec<&str> = std::iter::once(book.title.as_str())
        .chain(book.chapters.iter().map(|c| c.name.as_str()))
        .collect();
    let mut font = TitleFont::select(cli.tt_font.as_deref(), &texts, font::SYSTEM_CJK_FONTS)?;

    let canvas = Canvas::fit(book.picture_dims(), cli.min_size.dimensions_pt(), cli.padding.max(0.0));
    tracing::info!(
        "{} chapter(s), {} picture(s), page size {}x{} pt",
        book.chapters.len(),
        book.picture_count(),
        canvas.width,
        canvas.height
    );

    let font_size = cli.font_size as f32;
    let pages = layout::paginate(&book, canvas, font_size, &|text: &str, size: f32| {
        font.measure(text, size)
    });

    let meta = render::Metadata {
        title: cli.title.as_deref().unwrap_or(&name),
        author: cli.author.as_deref(),
    };
    render::make_book(&book, &pages, canvas, &mut font, &meta, save_path, cli.quiet)?;

    println!("Done: {}", absolute(save_path).display());
    Ok(ExitCode::SUCCESS)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
