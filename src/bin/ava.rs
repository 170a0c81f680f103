use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ava::FrameStream as _;

#[derive(Parser, Debug)]
#[command(name = "ava", version, about = "Render numbered frames from an image-operation graph")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every frame of the graph root (or a sub-range).
    Render(RenderArgs),
    /// Render a single frame into a file.
    Frame(FrameArgs),
    /// Print the root, its stream length and every node's length.
    Info(GraphArg),
    /// Print the graph in Graphviz DOT format.
    Dot(GraphArg),
}

#[derive(Args, Debug)]
struct GraphArg {
    /// Graph description JSON.
    #[arg(long)]
    graph: PathBuf,
}

#[derive(Args, Debug)]
struct ToolArgs {
    /// Path to ImageMagick `convert` (default: looked up on PATH).
    #[arg(long)]
    convert: Option<PathBuf>,

    /// Path to ImageMagick `composite`.
    #[arg(long)]
    composite: Option<PathBuf>,

    /// Path to ImageMagick `montage`.
    #[arg(long)]
    montage: Option<PathBuf>,

    /// Directory for temporary artifacts (default: the output directory).
    #[arg(long)]
    scratch: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    graph: GraphArg,

    /// Output directory.
    #[arg(long, default_value = "output")]
    out: PathBuf,

    /// Output file-name prefix.
    #[arg(long, default_value = "ani_")]
    prefix: String,

    /// Worker count (default: host concurrency).
    #[arg(long)]
    threads: Option<usize>,

    /// First frame to render.
    #[arg(long)]
    from: Option<u64>,

    /// Render up to, but not including, this frame.
    #[arg(long)]
    to: Option<u64>,

    #[command(flatten)]
    tools: ToolArgs,
}

#[derive(Args, Debug)]
struct FrameArgs {
    #[command(flatten)]
    graph: GraphArg,

    /// Frame index (0-based).
    #[arg(long)]
    frame: u64,

    /// Output image path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    tools: ToolArgs,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Info(args) => cmd_info(args),
        Command::Dot(args) => cmd_dot(args),
    }
}

fn read_graph(arg: &GraphArg) -> anyhow::Result<ava::GraphDesc> {
    ava::GraphDesc::load(&arg.graph)
        .with_context(|| format!("load graph '{}'", arg.graph.display()))
}

fn make_backend(tools: &ToolArgs) -> anyhow::Result<ava::MagickBackend> {
    let overrides = ava::ToolOverrides {
        convert: tools.convert.clone(),
        composite: tools.composite.clone(),
        montage: tools.montage.clone(),
    };
    let paths = ava::ToolPaths::resolve(&overrides)?;
    Ok(ava::MagickBackend::new(paths))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let desc = read_graph(&args.graph)?;
    // Validate before looking for ImageMagick so graph errors are reported first.
    let len = ava::build_graph(&desc)?.len();
    let backend = make_backend(&args.tools)?;

    let range = match (args.from, args.to) {
        (None, None) => None,
        (from, to) => Some(ava::FrameRange::new(
            ava::FrameIndex(from.unwrap_or(0)),
            ava::FrameIndex(to.unwrap_or(len)),
        )?),
    };

    let cancel = ava::CancelFlag::new();
    cancel.install_signal_handlers()?;

    let opts = ava::RenderOptions {
        output_dir: args.out,
        prefix: args.prefix,
        scratch_dir: args.tools.scratch,
        threads: args.threads,
        range,
        cancel: Some(cancel),
        ..ava::RenderOptions::default()
    };

    let stats = ava::render_all(&desc, &backend, &opts)?;
    eprintln!(
        "wrote {} of {} frames to {}",
        stats.frames_rendered,
        stats.frames_total,
        opts.output_dir.display()
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let desc = read_graph(&args.graph)?;
    ava::build_graph(&desc)?;
    let backend = make_backend(&args.tools)?;

    let scratch = match &args.tools.scratch {
        Some(dir) => dir.clone(),
        None => std::env::temp_dir(),
    };
    ava::render_frame_to(
        &desc,
        ava::FrameIndex(args.frame),
        &args.out,
        &backend,
        &scratch,
    )?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_info(args: GraphArg) -> anyhow::Result<()> {
    let desc = read_graph(&args)?;
    let graph = ava::build_graph(&desc)?;

    println!("root:   {}", graph.root().name());
    println!("frames: {}", graph.len());
    for node in graph.nodes() {
        println!(
            "  {:<24} {:<16} {}",
            node.name(),
            node.type_name(),
            node.stream_len()
        );
    }
    Ok(())
}

fn cmd_dot(args: GraphArg) -> anyhow::Result<()> {
    let desc = read_graph(&args)?;
    let graph = ava::build_graph(&desc)?;
    print!("{}", ava::to_dot(&graph));
    Ok(())
}
