use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use log::warn;

use vartab::filter::LabeledFilter;
use vartab::locus::Locus;
use vartab::pileup;
use vartab::reader::{write_sam, SamRecords, VcfRecords};
use vartab::record::{ReadRecord, Record, Variant};
use vartab::sources::align;
use vartab::types::{Metadata, Value};

#[derive(Parser)]
#[command(name = "vartab")]
#[command(version, about = "Filter genomic variants and sequencing reads with attribute expressions")]
#[command(long_about = "Filter genomic variants and sequencing reads with attribute expressions.

Examples:
  vartab variants --variants calls.vcf --variant-filter \"ref=='A'\"
  vartab reads --reads sample.sam --locus chr22:46930257 --read-filter is_duplicate
  vartab allele-support --reads sample.sam --locus chr22:46930257 rev:is_reverse")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, filter and tabulate variants from VCF sources
    Variants(VariantsArgs),
    /// Load, filter and tabulate or re-serialize reads from SAM sources
    Reads(ReadsArgs),
    /// Count allele support at loci from aligned reads
    AlleleSupport(AlleleSupportArgs),
}

#[derive(Args)]
struct VariantsArgs {
    /// VCF file(s), optionally gzip-compressed; a `#genome=NAME` fragment
    /// tags the source with a reference genome
    #[arg(long = "variants", num_args = 1..)]
    variants: Vec<String>,

    /// Filter expression(s); repeat the flag to filter sources positionally
    #[arg(long = "variant-filter", num_args = 1.., action = ArgAction::Append, value_parser = clap::value_parser!(String))]
    variant_filter: Vec<Vec<String>>,

    /// Override the derived source names
    #[arg(long = "variant-source-name", num_args = 1..)]
    variant_source_name: Option<Vec<String>>,

    /// Reference genome applied to sources without a `#genome=` fragment
    #[arg(long = "variant-genome")]
    variant_genome: Option<String>,

    /// Keep variants whose FILTER column is not PASS
    #[arg(long = "include-failing-variants")]
    include_failing_variants: bool,

    #[arg(long = "max-variants-per-source")]
    max_variants_per_source: Option<usize>,

    /// Literal variant; can be given any number of times
    #[arg(long = "single-variant", num_args = 3, value_names = ["LOCUS", "REF", "ALT"], action = ArgAction::Append, value_parser = clap::value_parser!(String))]
    single_variant: Vec<Vec<String>>,

    /// Output CSV file (stdout if omitted)
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct ReadsArgs {
    /// SAM file(s), optionally gzip-compressed
    #[arg(long = "reads", num_args = 1.., required = true)]
    reads: Vec<String>,

    /// Filter expression(s); repeat the flag to filter sources positionally
    #[arg(long = "read-filter", num_args = 1.., action = ArgAction::Append, value_parser = clap::value_parser!(String))]
    read_filter: Vec<Vec<String>>,

    /// Override the derived source names
    #[arg(long = "read-source-name", num_args = 1..)]
    read_source_name: Option<Vec<String>>,

    /// Restrict to reads overlapping a locus; repeatable
    #[arg(long = "locus", action = ArgAction::Append)]
    locus: Vec<String>,

    /// Output file; a .sam extension re-serializes, anything else is CSV
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct AlleleSupportArgs {
    /// SAM file(s), optionally gzip-compressed
    #[arg(long = "reads", num_args = 1.., required = true)]
    reads: Vec<String>,

    /// Filter expression(s) applied to reads before counting
    #[arg(long = "read-filter", num_args = 1.., action = ArgAction::Append, value_parser = clap::value_parser!(String))]
    read_filter: Vec<Vec<String>>,

    /// Override the derived source names
    #[arg(long = "read-source-name", num_args = 1..)]
    read_source_name: Option<Vec<String>>,

    /// Count alleles at a locus; repeatable
    #[arg(long = "locus", action = ArgAction::Append)]
    locus: Vec<String>,

    /// Take loci from the spans of these VCF sources
    #[arg(long = "variants", num_args = 1..)]
    variants: Vec<String>,

    /// Extra count columns: NAME:EXPR or a bare expression
    #[arg(value_name = "COUNT_FILTER")]
    count_filters: Vec<String>,

    /// Output CSV file (stdout if omitted)
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Variants(args) => run_variants(args),
        Commands::Reads(args) => run_reads(args),
        Commands::AlleleSupport(args) => run_allele_support(args),
    }
}

const STANDARD_COLUMNS: &[&str] = &[
    "genome",
    "contig",
    "interbase_start",
    "interbase_end",
    "ref",
    "alt",
];

type VariantKey = (String, String, u64, u64, String, String);

fn run_variants(args: VariantsArgs) -> Result<()> {
    if args.variants.is_empty() && args.single_variant.is_empty() {
        bail!("no variant sources given; use --variants and/or --single-variant");
    }
    let alignment = align(
        &args.variants,
        args.variant_source_name.as_deref(),
        &args.variant_filter,
    )?;

    let mut rows: IndexMap<VariantKey, IndexMap<String, Value>> = IndexMap::new();
    let mut sources_of: IndexMap<VariantKey, Vec<String>> = IndexMap::new();
    let mut metadata_columns: IndexSet<String> = IndexSet::new();

    for (i, raw_path) in args.variants.iter().enumerate() {
        let (path, fragment_genome) = split_genome_fragment(raw_path);
        let genome = fragment_genome
            .map(str::to_owned)
            .or_else(|| args.variant_genome.clone())
            .unwrap_or_default();
        let name = &alignment.names[i];
        let group = &alignment.groups[i];
        let prefix = if args.variants.len() == 1 {
            "metadata:".to_owned()
        } else {
            format!("metadata:{}:", name)
        };

        let reader =
            VcfRecords::from_path(path).with_context(|| format!("failed to open {}", path))?;
        let mut count = 0usize;
        for variant in reader {
            let variant = variant?;
            if !args.include_failing_variants && !variant.is_passing() {
                continue;
            }
            if let Some(max) = args.max_variants_per_source {
                if count >= max {
                    break;
                }
            }
            let metadata = variant_metadata(&variant);
            if !group.passes(&variant, &metadata)? {
                continue;
            }
            count += 1;
            record_row(
                &mut rows,
                &mut sources_of,
                &mut metadata_columns,
                &genome,
                &variant,
                &metadata,
                &prefix,
                name,
            );
        }
        if count == 0 {
            warn!("no variants loaded from: {}", path);
        }
    }

    for literal in &args.single_variant {
        let locus = Locus::parse(&literal[0])?;
        let variant = Variant::new(
            locus.contig(),
            locus.interbase_start() + 1,
            &literal[1],
            &literal[2],
        );
        let genome = args.variant_genome.clone().unwrap_or_default();
        record_row(
            &mut rows,
            &mut sources_of,
            &mut metadata_columns,
            &genome,
            &variant,
            &variant_metadata(&variant),
            "metadata:commandline:",
            "commandline",
        );
    }

    let genomes: IndexSet<&str> = rows.keys().map(|key| key.0.as_str()).collect();
    if genomes.len() > 1 {
        bail!(
            "mixing references is not supported; reference genomes: {}",
            genomes.iter().join(", ")
        );
    }

    let mut writer = csv::Writer::from_writer(open_output(&args.out)?);
    let mut header: Vec<String> = STANDARD_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(metadata_columns.iter().cloned());
    header.push("sources".to_owned());
    writer.write_record(&header)?;

    for (key, columns) in &rows {
        let (genome, contig, interbase_start, interbase_end, ref_allele, alt_allele) = key;
        let mut record = vec![
            genome.clone(),
            contig.clone(),
            interbase_start.to_string(),
            interbase_end.to_string(),
            ref_allele.clone(),
            alt_allele.clone(),
        ];
        for column in &metadata_columns {
            record.push(
                columns
                    .get(column)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        record.push(sources_of[key].join(" "));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// The per-variant metadata the core sees: id/qual/filter plus INFO keys
/// flattened with an `info:` prefix.
fn variant_metadata(variant: &Variant) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("id".into(), Value::from(variant.id().clone()));
    metadata.insert("qual".into(), Value::from(*variant.qual()));
    metadata.insert(
        "filter".into(),
        Value::List(
            variant
                .filters()
                .iter()
                .map(|f| Value::from(f.as_str()))
                .collect(),
        ),
    );
    for (key, value) in variant.info() {
        metadata.insert(format!("info:{}", key), value.clone());
    }
    metadata
}

#[allow(clippy::too_many_arguments)]
fn record_row(
    rows: &mut IndexMap<VariantKey, IndexMap<String, Value>>,
    sources_of: &mut IndexMap<VariantKey, Vec<String>>,
    metadata_columns: &mut IndexSet<String>,
    genome: &str,
    variant: &Variant,
    metadata: &Metadata,
    prefix: &str,
    source_name: &str,
) {
    let key = (
        genome.to_owned(),
        variant.contig().clone(),
        variant.interbase_start(),
        variant.interbase_end(),
        variant.ref_allele().clone(),
        variant.alt_allele().clone(),
    );
    let row = rows.entry(key.clone()).or_default();
    for (name, value) in metadata {
        let column = format!("{}{}", prefix, name);
        metadata_columns.insert(column.clone());
        row.insert(column, value.clone());
    }
    sources_of.entry(key).or_default().push(source_name.to_owned());
}

/// `path#genome=NAME` tags one source with its reference genome.
fn split_genome_fragment(path: &str) -> (&str, Option<&str>) {
    match path.split_once('#') {
        Some((path, fragment)) => (path, fragment.strip_prefix("genome=")),
        None => (path, None),
    }
}

fn run_reads(args: ReadsArgs) -> Result<()> {
    let alignment = align(&args.reads, args.read_source_name.as_deref(), &args.read_filter)?;
    let loci = parse_loci(&args.locus)?;

    let sam_out = args
        .out
        .as_ref()
        .and_then(|p| p.extension())
        .map(|e| e == "sam")
        .unwrap_or(false);
    if sam_out && args.reads.len() > 1 {
        bail!("--out with a .sam extension supports a single --reads source");
    }

    let mut kept: Vec<(String, ReadRecord)> = Vec::new();
    let mut header_lines: Vec<String> = Vec::new();
    for (i, path) in args.reads.iter().enumerate() {
        let reader =
            SamRecords::from_path(path).with_context(|| format!("failed to open {}", path))?;
        if i == 0 {
            header_lines = reader.header_lines().to_vec();
        }
        let name = alignment.names[i].clone();
        let group = &alignment.groups[i];
        let mut count = 0usize;
        for read in reader {
            let read = read?;
            if !loci.is_empty() && !overlaps_any(&read, &loci) {
                continue;
            }
            if !group.passes(&read, &Metadata::new())? {
                continue;
            }
            count += 1;
            kept.push((name.clone(), read));
        }
        if count == 0 {
            warn!("no reads loaded from: {}", path);
        }
    }

    if sam_out {
        let path = args.out.expect("checked above");
        let file =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let reads: Vec<ReadRecord> = kept.into_iter().map(|(_, read)| read).collect();
        write_sam(file, &header_lines, &reads)?;
        return Ok(());
    }

    let mut writer = csv::Writer::from_writer(open_output(&args.out)?);
    writer.write_record(&[
        "source",
        "name",
        "contig",
        "interbase_start",
        "interbase_end",
        "mapping_quality",
        "cigar",
    ])?;
    for (source, read) in &kept {
        writer.write_record(&[
            source.clone(),
            read.name().clone(),
            read.contig().clone(),
            read.interbase_start().to_string(),
            read.interbase_end().to_string(),
            read.mapping_quality().to_string(),
            read.cigar_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn run_allele_support(args: AlleleSupportArgs) -> Result<()> {
    let alignment = align(&args.reads, args.read_source_name.as_deref(), &args.read_filter)?;

    let mut loci: IndexSet<Locus> = parse_loci(&args.locus)?.into_iter().collect();
    for raw_path in &args.variants {
        let (path, _) = split_genome_fragment(raw_path);
        let reader =
            VcfRecords::from_path(path).with_context(|| format!("failed to open {}", path))?;
        for variant in reader {
            let variant = variant?;
            if !variant.is_passing() {
                continue;
            }
            loci.insert(Locus::interbase(
                variant.contig(),
                variant.interbase_start(),
                variant.interbase_end(),
            ));
        }
    }
    if loci.is_empty() {
        bail!("no loci given; use --locus and/or --variants");
    }

    let labeled: Vec<LabeledFilter> = args
        .count_filters
        .iter()
        .map(|token| LabeledFilter::parse(token))
        .collect::<Result<_, _>>()?;

    let loci_vec: Vec<Locus> = loci.iter().cloned().collect();
    let mut reads: Vec<ReadRecord> = Vec::new();
    for (i, path) in args.reads.iter().enumerate() {
        let reader =
            SamRecords::from_path(path).with_context(|| format!("failed to open {}", path))?;
        let group = &alignment.groups[i];
        let mut count = 0usize;
        for read in reader {
            let read = read?;
            if !overlaps_any(&read, &loci_vec) {
                continue;
            }
            if !group.passes(&read, &Metadata::new())? {
                continue;
            }
            count += 1;
            reads.push(read);
        }
        if count == 0 {
            warn!("no reads loaded from: {}", path);
        }
    }

    let mut writer = csv::Writer::from_writer(open_output(&args.out)?);
    let mut header = vec![
        "contig".to_owned(),
        "interbase_start".to_owned(),
        "interbase_end".to_owned(),
        "allele".to_owned(),
        "count".to_owned(),
    ];
    header.extend(labeled.iter().map(|lf| lf.label.clone()));
    writer.write_record(&header)?;

    for locus in &loci_vec {
        for row in pileup::allele_support(locus, &reads, &labeled)? {
            let mut record = vec![
                row.contig.clone(),
                row.interbase_start.to_string(),
                row.interbase_end.to_string(),
                row.allele.clone(),
                row.count.to_string(),
            ];
            record.extend(row.extra_counts.iter().map(|c| c.to_string()));
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn parse_loci(tokens: &[String]) -> Result<Vec<Locus>> {
    tokens
        .iter()
        .map(|token| Locus::parse(token).map_err(Into::into))
        .collect()
}

fn overlaps_any(read: &ReadRecord, loci: &[Locus]) -> bool {
    read.is_mapped()
        && loci
            .iter()
            .any(|l| l.overlaps(read.contig(), read.interbase_start(), read.interbase_end()))
}

fn open_output(out: &Option<PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match out {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    })
}
