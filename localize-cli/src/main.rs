use cv_localize::{
    load_keyfile, load_query_list, write_correspondences, write_details, write_positions,
    AssignmentStore, Database, FlatVocabulary, GpsTable, ImageFileMetadata, ImageMetadata,
    LocalizeSettings, Localizer, QueryImage, Reconstruction,
};
use log::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(
    name = "localize",
    about = "Finds 2D-3D correspondences between query images and a reconstruction",
    rename_all = "kebab-case"
)]
struct Opt {
    /// A file listing the `.key` files of the query images.
    ///
    /// The dimensions of each query are read from the `.jpg` next to its key file.
    #[structopt(short, long, parse(from_os_str))]
    queries: PathBuf,
    /// The cluster centers of the vocabulary
    #[structopt(short, long, parse(from_os_str))]
    clusters: PathBuf,
    /// The Hamming embedding and the word assignments of the database descriptors
    #[structopt(short, long, parse(from_os_str))]
    assignments: PathBuf,
    /// The reconstruction, either a Bundler `.out` file or a bincode cache
    #[structopt(short, long, parse(from_os_str))]
    reconstruction: PathBuf,
    /// Output file for the ranking and votes of every query
    #[structopt(long, parse(from_os_str))]
    details: PathBuf,
    /// Output file for the 2D positions of the selected correspondences
    #[structopt(long, parse(from_os_str))]
    positions: PathBuf,
    /// Output file for the 3D points of the selected correspondences
    #[structopt(long, parse(from_os_str))]
    correspondences: PathBuf,
    /// The file where settings are specified.
    ///
    /// This is in the format of `cv_localize::LocalizeSettings`. Values given on the command
    /// line take precedence.
    #[structopt(short, long, parse(from_os_str))]
    settings: Option<PathBuf>,
    #[structopt(long)]
    top_rank: Option<usize>,
    #[structopt(long)]
    top_rank_potential: Option<usize>,
    #[structopt(long)]
    ratio_test_threshold: Option<f64>,
    #[structopt(long)]
    score_threshold: Option<f64>,
    #[structopt(long)]
    hamming_distance_threshold: Option<u32>,
    #[structopt(long)]
    min_evidence: Option<usize>,
    /// Write the votes of the top ranked images to the details file, not just the counts
    #[structopt(long)]
    write_details: bool,
    /// Gps coordinates of the queries, in query list order
    #[structopt(long, parse(from_os_str))]
    query_gps: Option<PathBuf>,
    /// Gps coordinates of the database images, indexed by camera id
    #[structopt(long, parse(from_os_str))]
    database_gps: Option<PathBuf>,
    /// Only rank database images close to the query
    #[structopt(long)]
    use_gps: bool,
    /// The number of visual words each query descriptor is assigned to
    #[structopt(long)]
    paths: Option<usize>,
    /// The branching factor of the vocabulary tree the clusters came from
    #[structopt(long)]
    branching: Option<usize>,
    /// Cache the loaded reconstruction in bincode format at this path
    #[structopt(long, parse(from_os_str))]
    save_reconstruction: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Localize(#[from] cv_localize::Error),
    #[error("unable to load settings from {}: {source}", .path.display())]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

fn main() {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();
    if let Err(e) = run(opt) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn settings(opt: &Opt) -> Result<LocalizeSettings, CliError> {
    let mut settings: LocalizeSettings = match &opt.settings {
        Some(path) => {
            let file = File::open(path).map_err(|source| CliError::Open {
                path: path.clone(),
                source,
            })?;
            let settings =
                serde_json::from_reader(file).map_err(|source| CliError::Settings {
                    path: path.clone(),
                    source,
                })?;
            info!("loaded settings from {}", path.display());
            settings
        }
        None => {
            info!("used default settings");
            LocalizeSettings::default()
        }
    };
    if let Some(top_rank) = opt.top_rank {
        settings.top_rank = top_rank;
    }
    if let Some(top_rank_potential) = opt.top_rank_potential {
        settings.top_rank_potential = top_rank_potential;
    }
    if let Some(ratio_test_threshold) = opt.ratio_test_threshold {
        settings.ratio_test_threshold = ratio_test_threshold;
    }
    if let Some(score_threshold) = opt.score_threshold {
        settings.score_threshold = score_threshold;
    }
    if let Some(hamming_distance_threshold) = opt.hamming_distance_threshold {
        settings.hamming_distance_threshold = hamming_distance_threshold;
    }
    if let Some(min_evidence) = opt.min_evidence {
        settings.min_evidence = min_evidence;
    }
    if let Some(paths) = opt.paths {
        settings.vocabulary_paths = paths;
    }
    settings.use_gps |= opt.use_gps;
    settings.validate()?;
    Ok(settings)
}

fn create(path: &Path) -> Result<BufWriter<File>, CliError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| CliError::Open {
            path: path.to_path_buf(),
            source,
        })
}

fn run(opt: Opt) -> Result<(), CliError> {
    let settings = settings(&opt)?;
    info!("{:?}", settings);
    if let Some(branching) = opt.branching {
        info!(
            "vocabulary branching factor {}, cluster centers are searched exhaustively",
            branching
        );
    }

    // Fail on unwritable outputs before the expensive loading.
    let mut positions = create(&opt.positions)?;
    let mut correspondences = create(&opt.correspondences)?;
    let mut details = create(&opt.details)?;

    let queries = load_query_list(&opt.queries)?;
    info!("{} queries to localize", queries.len());
    let vocabulary = FlatVocabulary::load(&opt.clusters, settings.vocabulary_paths)?;

    let reconstruction = Reconstruction::load(&opt.reconstruction)?;
    if let Some(path) = &opt.save_reconstruction {
        info!("saving the reconstruction to {}", path.display());
        let mut file = create(path)?;
        reconstruction.to_bincode(&mut file)?;
        file.flush()?;
    }
    let assignments = AssignmentStore::load(&opt.assignments)?;
    let (small, empty) = assignments.bucket_statistics();
    info!(
        "{} of {} words are empty and {} are small",
        empty,
        assignments.num_words(),
        small
    );
    let database = Database::new(reconstruction, assignments)?;

    let query_gps = opt.query_gps.as_ref().map(GpsTable::load).transpose()?;
    let database_gps = opt.database_gps.as_ref().map(GpsTable::load).transpose()?;
    if let (Some(table), Some(last)) = (&query_gps, queries.len().checked_sub(1)) {
        table.get("query image", last)?;
    }

    let mut localizer = Localizer::new(&database, &vocabulary, settings)?;
    if let Some(table) = &database_gps {
        localizer = localizer.with_database_gps(table)?;
    }

    let metadata = ImageFileMetadata;
    for (ix, keyfile) in queries.iter().enumerate() {
        info!("query {} of {}: {}", ix + 1, queries.len(), keyfile.display());
        let (width, height) = metadata.dimensions(keyfile)?;
        let keypoints = load_keyfile(keyfile)?;
        let image = QueryImage::new(width, height, keypoints, settings.root_sift_scale);
        let gps = query_gps
            .as_ref()
            .map(|table| table.get("query image", ix))
            .transpose()?;
        match localizer.localize(image, gps)? {
            Some(result) => {
                write_positions(&mut positions, ix, &result)?;
                write_correspondences(
                    &mut correspondences,
                    ix,
                    &result,
                    &database.reconstruction,
                )?;
                write_details(
                    &mut details,
                    ix,
                    &result,
                    &database.reconstruction,
                    &settings,
                    opt.write_details,
                )?;
            }
            None => {
                warn!("skipped query {}", keyfile.display());
                writeln!(positions, "{} 0\n{} 0", ix, ix)?;
                writeln!(correspondences, "{} 0\n{} 0", ix, ix)?;
                writeln!(details, "query {} corrs 0", ix)?;
            }
        }
    }

    positions.flush()?;
    correspondences.flush()?;
    details.flush()?;
    localizer.timings().log();
    Ok(())
}
