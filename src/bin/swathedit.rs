use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use swathedit::edits::io::read_esf;
use swathedit::edits::store::EditOutput;
use swathedit::geometry::attitude::BiasParameters;
use swathedit::gridding::grid::GridAlgorithm;
use swathedit::swath::reader::read_soundings_file;
use swathedit::utils::time::format_epoch;
use swathedit::{EditorSession, SessionConfig, SessionObserver};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

fn main() {
    if let Err(e) = bin_main() {
        eprintln!("error: {e}");
        if let Some(e) = e.source() {
            eprintln!("error: {e}")
        }
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the records of an edit save file
    DumpEsf {
        /// Edit save file
        #[arg()]
        esf: PathBuf,
    },

    /// Grid decoded sounding files, replaying their edit logs
    Grid {
        /// Decoded sounding CSV file(s)
        #[arg(num_args = 1..)]
        infiles: Vec<PathBuf>,

        /// Output grid CSV file path
        #[arg(short, long)]
        outfile: Option<PathBuf>,

        /// Cell size in meters, derived from the survey depth by default
        #[arg(long, visible_alias = "cs")]
        cell_size: Option<f64>,

        /// Roll bias in degrees
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        roll: f64,

        /// Pitch bias in degrees
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        pitch: f64,

        /// Heading bias in degrees
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        heading: f64,

        /// Time lag in seconds
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        time_lag: f64,

        /// Sound speed ratio
        #[arg(long, default_value = "1")]
        snell: f64,

        /// Grid with the unweighted mean instead of footprint weights
        #[arg(long, action = clap::ArgAction::SetTrue)]
        simple_mean: bool,

        /// Read edit logs without writing to them
        #[arg(long, action = clap::ArgAction::SetTrue)]
        browse: bool,
    },
}

/// Shows session progress on a terminal bar.
struct ProgressObserver {
    bar: ProgressBar,
}

impl SessionObserver for ProgressObserver {
    fn progress(&mut self, message: &str, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
        self.bar.set_message(message.to_string());
    }
}

fn bin_main() -> BinResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("swathedit=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::DumpEsf { esf } => dump_esf(esf),
        Command::Grid {
            infiles,
            outfile,
            cell_size,
            roll,
            pitch,
            heading,
            time_lag,
            snell,
            simple_mean,
            browse,
        } => {
            let config = SessionConfig {
                cell_size,
                algorithm: if simple_mean {
                    GridAlgorithm::SimpleMean
                } else {
                    GridAlgorithm::Footprint
                },
                edit_output: if browse {
                    EditOutput::Browse
                } else {
                    EditOutput::Write
                },
                ..Default::default()
            };
            let bias = BiasParameters {
                roll,
                pitch,
                heading,
                time_lag,
                snell,
            };
            grid(infiles, outfile, config, bias)
        }
    }
}

fn dump_esf(esf: PathBuf) -> BinResult<()> {
    let contents = read_esf(&esf)?;
    println!("time,beam,multiplicity,action");
    for record in &contents.records {
        println!(
            "{},{},{},{:?}",
            format_epoch(record.time_d),
            record.beam_index(),
            record.multiplicity(),
            record.action
        );
    }
    if contents.unknown_actions > 0 {
        eprintln!("{} records with unknown actions", contents.unknown_actions);
    }
    Ok(())
}

fn grid(
    infiles: Vec<PathBuf>,
    outfile: Option<PathBuf>,
    config: SessionConfig,
    bias: BiasParameters,
) -> BinResult<()> {
    let bar = ProgressBar::new(infiles.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    let mut session = EditorSession::new(config, Box::new(ProgressObserver { bar: bar.clone() }));

    for path in &infiles {
        bar.set_message(format!("Reading {}", path.display()));
        let decoded = read_soundings_file(path)?;
        let (index, report) = session.load_file(decoded)?;
        if report.skipped() > 0 {
            warn!(
                file = index,
                path = %path.display(),
                skipped = report.skipped(),
                "edits in the log do not match this file"
            );
        }
        bar.inc(1);
    }
    if !bias.is_identity() {
        session.on_bias_changed(bias)?;
    }
    session.setup_grid()?;
    bar.finish_and_clear();

    let grid = session.grid().ok_or("No grid was made")?;
    let g = grid.geometry();
    info!(
        columns = g.n_columns,
        rows = g.n_rows,
        cell_size = g.dx,
        cells_with_data = grid.cells_with_data(),
        failures = session.projection_failures(),
        "grid made"
    );
    if let Some((min, max)) = grid.value_range() {
        println!("Elevation range: {min:.3} to {max:.3}");
    }

    if let Some(outfile) = outfile {
        let mut writer = csv::Writer::from_path(&outfile)?;
        writer.write_record(["x", "y", "elevation", "sigma"])?;
        for i in 0..g.n_columns {
            for j in 0..g.n_rows {
                if let Some(cell) = grid.cell(i, j) {
                    let Some(value) = cell.value else {
                        continue;
                    };
                    let (x, y) = g.cell_center(i, j);
                    writer.write_record(&[
                        format!("{x:.3}"),
                        format!("{y:.3}"),
                        format!("{value:.3}"),
                        cell.sigma.map_or(String::new(), |s| format!("{s:.3}")),
                    ])?;
                }
            }
        }
        writer.flush()?;
        info!(?outfile, "grid written");
    }
    Ok(())
}
