use cv_localize::{
    write_correspondences, write_details, write_positions, AssignmentStore, ChosenBy, Database,
    Error, GpsCoordinate, GpsTable, LocalizeSettings, Localizer, Point, QueryFeature,
    QueryImage, Reconstruction, ScoreParameters, Vocabulary, WordEntry,
};
use approx::assert_relative_eq;
use hamming_embedding::{
    signature_from_code, Descriptor, HammingEmbedding, DESCRIPTOR_DIMENSIONS, SIGNATURE_BITS,
};
use nalgebra::{DMatrix, Point2, Point3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

const WORDS: usize = 4;
const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// Picks the word stored in the last descriptor component.
struct TaggedVocabulary;

impl Vocabulary for TaggedVocabulary {
    fn num_words(&self) -> usize {
        WORDS
    }

    fn assign(&self, descriptor: &Descriptor) -> Vec<usize> {
        vec![descriptor[DESCRIPTOR_DIMENSIONS - 1] as usize % WORDS]
    }
}

/// A Walsh code. Distinct codes differ in exactly 32 bits.
fn walsh(k: u64) -> u64 {
    (0..64u64)
        .filter(|i| (i & k).count_ones() % 2 == 1)
        .fold(0, |code, i| code | 1 << i)
}

fn point_code(point: usize) -> u64 {
    walsh(point as u64 + 1)
}

/// A descriptor whose signature is `code` in every word and which is assigned to `word`.
fn descriptor(code: u64, word: usize) -> Descriptor {
    let mut descriptor = [0; DESCRIPTOR_DIMENSIONS];
    for (bit, component) in descriptor.iter_mut().take(SIGNATURE_BITS).enumerate() {
        if code >> bit & 1 == 1 {
            *component = 1;
        }
    }
    descriptor[DESCRIPTOR_DIMENSIONS - 1] = word as u8;
    descriptor
}

/// Camera 0 sees points 0..12, camera 1 sees 8..16 and camera 2 sees 16..20.
///
/// Point `p` has a single descriptor in word `p % WORDS`.
fn database() -> Database {
    database_with(&[])
}

/// Like [`database`], with `(code, word, camera)` points appended after point 19.
fn database_with(extra: &[(u64, usize, usize)]) -> Database {
    let num_points = 20 + extra.len();
    let points = (0..num_points)
        .map(|p| {
            let views = match p {
                0..=7 => vec![0],
                8..=11 => vec![0, 1],
                12..=15 => vec![1],
                16..=19 => vec![2],
                _ => vec![extra[p - 20].2],
            };
            Point {
                position: Point3::new(p as f64, -(p as f64), 0.5),
                color: [255, 0, 0],
                views,
            }
        })
        .collect();
    let reconstruction = Reconstruction::from_views(3, points).unwrap();

    let projection = DMatrix::from_fn(SIGNATURE_BITS, DESCRIPTOR_DIMENSIONS, |r, c| {
        if r == c {
            1.0
        } else {
            0.0
        }
    });
    let thresholds = DMatrix::from_element(SIGNATURE_BITS, WORDS, 0.5);
    let embedding = HammingEmbedding::new(projection, thresholds).unwrap();
    let signatures = (0..num_points)
        .map(|p| match p {
            0..=19 => point_code(p),
            _ => extra[p - 20].0,
        })
        .map(signature_from_code)
        .collect();
    let mut buckets = vec![vec![]; WORDS];
    for p in 0..num_points {
        let word = if p < 20 { p % WORDS } else { extra[p - 20].1 };
        buckets[word].push(WordEntry {
            point: p,
            descriptor: p,
        });
    }
    let assignments = AssignmentStore::new(num_points, embedding, signatures, buckets).unwrap();
    Database::new(reconstruction, assignments).unwrap()
}

/// One feature per listed point, each in its own grid cell, at distance `flips` from it.
fn query(points: &[usize], flips: usize, seed: u64) -> QueryImage {
    let mut rng = Pcg64::seed_from_u64(seed);
    let features = points
        .iter()
        .enumerate()
        .map(|(ix, &p)| {
            let mut code = point_code(p);
            for bit in rand::seq::index::sample(&mut rng, 64, flips).into_iter() {
                code ^= 1 << bit;
            }
            let (col, row) = (ix / 4, ix % 4);
            let x = col as f64 * 160.0 + 80.0 + rng.gen_range(-20.0..20.0);
            let y = row as f64 * 120.0 + 60.0 + rng.gen_range(-20.0..20.0);
            QueryFeature {
                position: Point2::new(
                    x - (WIDTH as f64 - 1.0) / 2.0,
                    (HEIGHT as f64 - 1.0) / 2.0 - y,
                ),
                descriptor: descriptor(code, p % WORDS),
            }
        })
        .collect();
    QueryImage {
        width: WIDTH,
        height: HEIGHT,
        features,
        out_of_bounds: false,
    }
}

fn first_points() -> Vec<usize> {
    (0..12).collect()
}

#[test]
fn localizes_synthetic_query() {
    let _ = pretty_env_logger::try_init_timed();
    let database = database();
    let mut localizer =
        Localizer::new(&database, TaggedVocabulary, LocalizeSettings::default()).unwrap();
    let result = localizer
        .localize(query(&first_points(), 2, 0), None)
        .unwrap()
        .unwrap();

    assert_eq!(result.context.correspondences.len(), 12);
    for correspondence in &result.context.correspondences {
        assert_eq!(correspondence.point, correspondence.feature);
        assert_eq!(correspondence.distance, 2);
        assert_eq!(correspondence.bucket_size, 5);
        assert!(correspondence.score >= 1.0);
    }

    let ranked: Vec<usize> = result.ranking.iter().map(|ranked| ranked.camera).collect();
    assert_eq!(ranked, vec![0, 1]);
    assert!(result.ranking[0].probability > result.ranking[1].probability);

    let selection = &result.selection;
    assert_eq!(selection.primary.len(), 12);
    assert!(selection
        .primary
        .iter()
        .all(|&id| selection.chosen[id] == Some(ChosenBy::Direct)));
    assert_eq!(selection.potential.len(), 12);
    assert_eq!(
        selection.bins.iter().map(|bin| bin.quota).sum::<usize>(),
        30
    );
    for bin in &selection.bins {
        assert!(bin.contained <= bin.quota);
    }
    assert_eq!(localizer.timings().total.samples, 1);
}

#[test]
fn selection_is_deterministic() {
    let database = database();
    let mut localizer =
        Localizer::new(&database, TaggedVocabulary, LocalizeSettings::default()).unwrap();
    let a = localizer
        .localize(query(&first_points(), 3, 7), None)
        .unwrap()
        .unwrap();
    let b = localizer
        .localize(query(&first_points(), 3, 7), None)
        .unwrap()
        .unwrap();
    assert_eq!(a.context.correspondences, b.context.correspondences);
    assert_eq!(a.ranking, b.ranking);
    assert_eq!(a.selection, b.selection);
}

#[test]
fn empty_query() {
    let database = database();
    let mut localizer =
        Localizer::new(&database, TaggedVocabulary, LocalizeSettings::default()).unwrap();
    let result = localizer.localize(query(&[], 0, 0), None).unwrap().unwrap();
    assert!(result.context.correspondences.is_empty());
    assert!(result.ranking.is_empty());
    assert!(result.selection.primary.is_empty());
    assert!(result.selection.potential.is_empty());

    let mut positions = vec![];
    write_positions(&mut positions, 3, &result).unwrap();
    assert_eq!(String::from_utf8(positions).unwrap(), "3 0\n3 0\n");
}

#[test]
fn exact_sole_matches_carry_no_evidence() {
    let database = database();
    let mut localizer =
        Localizer::new(&database, TaggedVocabulary, LocalizeSettings::default()).unwrap();
    let result = localizer
        .localize(query(&first_points(), 0, 0), None)
        .unwrap()
        .unwrap();
    assert_eq!(result.context.correspondences.len(), 12);
    // The mean distance of each feature is zero, and so is every score.
    assert!(result
        .context
        .correspondences
        .iter()
        .all(|correspondence| correspondence.score == 0.0 && correspondence.ratio == 0.0));
    assert!(result.ranking.is_empty());
    assert!(result.selection.primary.is_empty());
}

#[test]
fn exact_match_outscores_the_other_matches_of_its_feature() {
    // Point 20 is 8 bits away from point 0 and is seen by camera 2.
    let database = database_with(&[(point_code(0) ^ 0xff, 0, 2)]);
    let settings = LocalizeSettings {
        min_evidence: 1,
        ..LocalizeSettings::default()
    };
    let mut localizer = Localizer::new(&database, TaggedVocabulary, settings).unwrap();
    let result = localizer
        .localize(query(&[0], 0, 0), None)
        .unwrap()
        .unwrap();

    let correspondences = &result.context.correspondences;
    assert_eq!(correspondences.len(), 2);
    let exact = correspondences
        .iter()
        .position(|correspondence| correspondence.point == 0)
        .unwrap();
    let other = 1 - exact;
    assert_eq!(correspondences[exact].distance, 0);
    assert_eq!(correspondences[other].point, 20);
    assert_eq!(correspondences[other].distance, 8);
    // The feature averages a distance of 4.
    assert_relative_eq!(
        correspondences[exact].score,
        ScoreParameters::default().score(0, 4.0)
    );
    assert!(correspondences[exact].score > correspondences[other].score);
    assert_eq!(correspondences[exact].ratio, 0.0);

    let ranked: Vec<usize> = result.ranking.iter().map(|ranked| ranked.camera).collect();
    assert_eq!(ranked, vec![0, 2]);
    assert_eq!(result.selection.primary[0], exact);
}

#[test]
fn distant_features_do_not_match() {
    let database = database();
    let mut localizer =
        Localizer::new(&database, TaggedVocabulary, LocalizeSettings::default()).unwrap();
    // Complemented signatures are 64 bits from their point and 32 from every other one.
    let mut image = query(&first_points(), 0, 0);
    for feature in &mut image.features {
        for component in feature.descriptor.iter_mut().take(SIGNATURE_BITS) {
            *component = 1 - *component;
        }
    }
    let result = localizer.localize(image, None).unwrap().unwrap();
    assert!(result.context.correspondences.is_empty());
    assert!(result.ranking.is_empty());
}

fn gps_table(cameras: &[(f64, f64)]) -> GpsTable {
    GpsTable {
        coordinates: cameras
            .iter()
            .map(|&(latitude, longitude)| GpsCoordinate::new(latitude, longitude))
            .collect(),
    }
}

#[test]
fn gps_filter_restricts_ranking() {
    let database = database();
    let settings = LocalizeSettings {
        use_gps: true,
        ..LocalizeSettings::default()
    };
    // Camera 0 is about 1.1 km away, camera 1 about 110 m.
    let table = gps_table(&[(47.01, 8.0), (47.001, 8.0), (47.0, 8.0)]);
    let mut localizer = Localizer::new(&database, TaggedVocabulary, settings)
        .unwrap()
        .with_database_gps(&table)
        .unwrap();
    let query_gps = GpsCoordinate::new(47.0, 8.0);
    let result = localizer
        .localize(query(&first_points(), 2, 0), Some(query_gps))
        .unwrap()
        .unwrap();
    let ranked: Vec<usize> = result.ranking.iter().map(|ranked| ranked.camera).collect();
    assert_eq!(ranked, vec![1]);
    let distances = result.camera_distances_km.unwrap();
    assert_eq!(distances.len(), 1);
    assert!(distances[0] < 0.3);
}

#[test]
fn gps_filter_can_empty_ranking() {
    let database = database();
    let settings = LocalizeSettings {
        use_gps: true,
        ..LocalizeSettings::default()
    };
    let table = gps_table(&[(48.0, 8.0), (48.0, 8.0), (48.0, 8.0)]);
    let mut localizer = Localizer::new(&database, TaggedVocabulary, settings)
        .unwrap()
        .with_database_gps(&table)
        .unwrap();
    let result = localizer
        .localize(
            query(&first_points(), 2, 0),
            Some(GpsCoordinate::new(47.0, 8.0)),
        )
        .unwrap()
        .unwrap();
    assert!(result.ranking.is_empty());
    assert!(result.selection.primary.is_empty());
    assert!(result.selection.potential.is_empty());
}

#[test]
fn gps_filter_needs_coordinates() {
    let database = database();
    let settings = LocalizeSettings {
        use_gps: true,
        ..LocalizeSettings::default()
    };
    let mut localizer = Localizer::new(&database, TaggedVocabulary, settings).unwrap();
    assert!(matches!(
        localizer.localize(query(&first_points(), 2, 0), Some(GpsCoordinate::new(47.0, 8.0))),
        Err(Error::Setting { name: "use_gps", .. })
    ));
}

#[test]
fn database_gps_must_cover_cameras() {
    let database = database();
    let table = gps_table(&[(47.0, 8.0)]);
    let localizer =
        Localizer::new(&database, TaggedVocabulary, LocalizeSettings::default()).unwrap();
    assert!(matches!(
        localizer.with_database_gps(&table),
        Err(Error::MissingGps { index: 1, len: 1, .. })
    ));
}

#[test]
fn out_of_bounds_queries_can_be_skipped() {
    let database = database();
    let settings = LocalizeSettings {
        skip_out_of_bounds_queries: true,
        ..LocalizeSettings::default()
    };
    let mut localizer = Localizer::new(&database, TaggedVocabulary, settings).unwrap();
    let mut image = query(&first_points(), 2, 0);
    image.out_of_bounds = true;
    assert!(localizer.localize(image, None).unwrap().is_none());
    assert_eq!(localizer.timings().total.samples, 0);
}

#[test]
fn output_formats() {
    let database = database();
    let mut localizer =
        Localizer::new(&database, TaggedVocabulary, LocalizeSettings::default()).unwrap();
    let result = localizer
        .localize(query(&first_points(), 2, 0), None)
        .unwrap()
        .unwrap();

    let mut positions = vec![];
    write_positions(&mut positions, 5, &result).unwrap();
    let positions = String::from_utf8(positions).unwrap();
    let lines: Vec<&str> = positions.lines().collect();
    assert_eq!(lines.len(), 26);
    assert_eq!(lines[0], "5 12");
    assert_eq!(lines[13], "5 12");
    assert_eq!(lines[1].split_whitespace().count(), 2);

    let mut points = vec![];
    write_correspondences(&mut points, 5, &result, &database.reconstruction).unwrap();
    let points = String::from_utf8(points).unwrap();
    let lines: Vec<&str> = points.lines().collect();
    assert_eq!(lines.len(), 26);
    let first = result.context.correspondences[result.selection.primary[0]].point;
    let fields: Vec<&str> = lines[1].split_whitespace().collect();
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[3], first.to_string());
    let x: f64 = fields[0].parse().unwrap();
    assert_eq!(x, first as f64);

    let mut details = vec![];
    write_details(
        &mut details,
        5,
        &result,
        &database.reconstruction,
        localizer.settings(),
        true,
    )
    .unwrap();
    let details = String::from_utf8(details).unwrap();
    let lines: Vec<&str> = details.lines().collect();
    assert_eq!(lines[0], "query 5 corrs 12");
    assert!(lines[1].starts_with("image -------------------- 0 12 "));
    assert!(lines[1].ends_with(" 4 - rank 0"));
    // Every vote of camera 0, then the header and votes of camera 1.
    assert_eq!(lines.len(), 1 + 1 + 12 + 1 + 4);
    assert!(lines[2].ends_with(" 1"));

    let mut summary = vec![];
    write_details(
        &mut summary,
        5,
        &result,
        &database.reconstruction,
        localizer.settings(),
        false,
    )
    .unwrap();
    assert_eq!(String::from_utf8(summary).unwrap(), "query 5 corrs 12\n");
}

#[test]
fn details_cover_the_potential_images() {
    let database = database();
    let settings = LocalizeSettings {
        top_rank: 1,
        top_rank_potential: 2,
        ..LocalizeSettings::default()
    };
    let mut localizer = Localizer::new(&database, TaggedVocabulary, settings).unwrap();
    let result = localizer
        .localize(query(&first_points(), 2, 0), None)
        .unwrap()
        .unwrap();
    assert_eq!(result.ranking.len(), 2);

    let mut details = vec![];
    write_details(
        &mut details,
        0,
        &result,
        &database.reconstruction,
        localizer.settings(),
        true,
    )
    .unwrap();
    let details = String::from_utf8(details).unwrap();
    let headers: Vec<&str> = details
        .lines()
        .filter(|line| line.starts_with("image "))
        .collect();
    assert_eq!(headers.len(), 2);
    assert!(headers[1].ends_with(" rank 1"));
}
