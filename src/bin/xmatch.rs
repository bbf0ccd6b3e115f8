use celestial_crossmatch::constants::{ARCSEC_PER_RAD, ARCSEC_TO_RAD, RAD_TO_DEG};
use celestial_crossmatch::{matching, BackendKind, Field, PixelIndex, SampleId};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// One slot per possible pixel; O(1) lookup, memory scales with the
    /// pixel count at the chosen order.
    Dense,
    /// AVL tree over populated pixels; memory scales with sky coverage.
    Tree,
}

impl From<Backend> for BackendKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Dense => BackendKind::DenseArray,
            Backend::Tree => BackendKind::BalancedTree,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "xmatch")]
#[command(about = "Cross-match astronomical catalogs by sky position")]
#[command(version)]
struct Cli {
    /// ASCII catalog files (id ra_deg dec_deg per line), one field each
    #[arg(required = true, num_args = 2..)]
    catalogs: Vec<PathBuf>,

    /// HEALPix order (nside = 2^order)
    #[arg(long, default_value = "13")]
    order: u32,

    /// Search radius in arcseconds
    #[arg(long, default_value = "2.0")]
    radius: f64,

    /// Bucket storage backend
    #[arg(long, value_enum, default_value = "tree")]
    backend: Backend,

    /// Use the parallel matcher
    #[arg(long)]
    parallel: bool,

    /// Print at most this many matched pairs
    #[arg(long, default_value = "0")]
    show_matches: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Report loading and indexing progress
    #[arg(short, long)]
    verbose: bool,
}

#[derive(serde::Serialize)]
struct PairReport {
    field: u32,
    catalog_id: i64,
    ra_deg: f64,
    dec_deg: f64,
    partner_field: u32,
    partner_catalog_id: i64,
    distance_arcsec: f64,
}

#[derive(serde::Serialize)]
struct Report {
    order: u32,
    radius_arcsec: f64,
    num_fields: usize,
    num_samples: usize,
    num_pixels: usize,
    match_count: usize,
    test_count: u64,
    elapsed_ms: f64,
    matches: Vec<PairReport>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut fields = Vec::with_capacity(cli.catalogs.len());
    for path in &cli.catalogs {
        let field = Field::open_ascii(path)?;
        if cli.verbose {
            eprintln!(
                "Loaded {} samples from {}",
                field.num_samples(),
                path.display()
            );
        }
        fields.push(field);
    }

    let start = Instant::now();
    let mut index = PixelIndex::build(&fields, cli.order, cli.backend.into())?;
    if cli.verbose {
        eprintln!(
            "Indexed {} samples into {} pixels at order {}",
            index.num_samples(),
            index.num_pixels(),
            cli.order
        );
    }

    let radius = cli.radius * ARCSEC_TO_RAD;
    let outcome = if cli.parallel {
        matching::run_parallel(&mut index, radius)
    } else {
        matching::run(&mut index, radius)
    };
    let elapsed = start.elapsed();

    let pairs = collect_pairs(&index, &outcome, cli.show_matches);
    match cli.format {
        OutputFormat::Table => {
            for pair in &pairs {
                println!(
                    "field {} id {:>8} ({:>11.6}, {:>+10.6}) <-> field {} id {:>8}  {:.4}\"",
                    pair.field,
                    pair.catalog_id,
                    pair.ra_deg,
                    pair.dec_deg,
                    pair.partner_field,
                    pair.partner_catalog_id,
                    pair.distance_arcsec
                );
            }
            println!(
                "{} matches across {} fields ({} samples, {} pairwise tests)",
                outcome.match_count(),
                fields.len(),
                index.num_samples(),
                outcome.test_count()
            );
            eprintln!(
                "Cross-match completed in {:.2} ms",
                elapsed.as_secs_f64() * 1000.0
            );
        }
        OutputFormat::Json => {
            let report = Report {
                order: cli.order,
                radius_arcsec: cli.radius,
                num_fields: fields.len(),
                num_samples: index.num_samples(),
                num_pixels: index.num_pixels(),
                match_count: outcome.match_count(),
                test_count: outcome.test_count(),
                elapsed_ms: elapsed.as_secs_f64() * 1000.0,
                matches: pairs,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn collect_pairs(
    index: &PixelIndex,
    outcome: &matching::MatchOutcome,
    limit: usize,
) -> Vec<PairReport> {
    outcome
        .iter_matches()
        .take(limit)
        .map(|(id, partner, distance)| pair_report(index, id, partner, distance))
        .collect()
}

fn pair_report(index: &PixelIndex, id: SampleId, partner: SampleId, distance: f64) -> PairReport {
    let sample = index.sample(id);
    let counterpart = index.sample(partner);
    PairReport {
        field: sample.field,
        catalog_id: sample.catalog_id,
        ra_deg: sample.ra * RAD_TO_DEG,
        dec_deg: sample.dec * RAD_TO_DEG,
        partner_field: counterpart.field,
        partner_catalog_id: counterpart.catalog_id,
        distance_arcsec: distance * ARCSEC_PER_RAD,
    }
}
