use crate::{
    matching, scoring, selection, voting, Database, Error, GpsCoordinate, GpsFilter, GpsTable,
    LocalizeSettings, QueryContext, QueryImage, QueryTimings, RankedCamera, Result,
    ScoreParameters, Selection, SelectionParameters, StageTimings, Vocabulary,
};
use log::*;
use std::time::Instant;

/// Everything computed while localizing one query image.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub image: QueryImage,
    pub context: QueryContext,
    pub ranking: Vec<RankedCamera>,
    pub selection: Selection,
    /// The distance in kilometers from the query to each ranked image, when gps coordinates
    /// are known.
    pub camera_distances_km: Option<Vec<f64>>,
    pub timings: QueryTimings,
}

/// Runs the correspondence search of query images against a database.
pub struct Localizer<'a, V> {
    database: &'a Database,
    vocabulary: V,
    settings: LocalizeSettings,
    database_gps: Option<&'a GpsTable>,
    timings: StageTimings,
}

impl<'a, V> Localizer<'a, V>
where
    V: Vocabulary + Sync,
{
    pub fn new(database: &'a Database, vocabulary: V, settings: LocalizeSettings) -> Result<Self> {
        settings.validate()?;
        if vocabulary.num_words() > database.assignments.num_words() {
            return Err(Error::inconsistent(
                "vocabulary",
                format!(
                    "the vocabulary has {} words but the assignments only {}",
                    vocabulary.num_words(),
                    database.assignments.num_words()
                ),
            ));
        }
        Ok(Self {
            database,
            vocabulary,
            settings,
            database_gps: None,
            timings: StageTimings::default(),
        })
    }

    /// Uses the gps coordinates of the database images, indexed by camera id.
    pub fn with_database_gps(self, database_gps: &'a GpsTable) -> Result<Self> {
        if let Some(camera) = self
            .database
            .reconstruction
            .cameras
            .iter()
            .find(|camera| camera.id >= database_gps.len())
        {
            return Err(Error::MissingGps {
                what: "database image",
                index: camera.id,
                len: database_gps.len(),
            });
        }
        Ok(Self {
            database_gps: Some(database_gps),
            ..self
        })
    }

    pub fn settings(&self) -> &LocalizeSettings {
        &self.settings
    }

    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    /// Localizes one query image.
    ///
    /// Returns `None` when the image is skipped because its keypoints do not fit its reported
    /// size and `skip_out_of_bounds_queries` is set.
    pub fn localize(
        &mut self,
        image: QueryImage,
        query_gps: Option<GpsCoordinate>,
    ) -> Result<Option<QueryResult>> {
        if image.out_of_bounds {
            warn!(
                "query keypoints exceed the reported image size {}x{}",
                image.width, image.height
            );
            if self.settings.skip_out_of_bounds_queries {
                return Ok(None);
            }
        }
        let gps = match (query_gps, self.database_gps) {
            (Some(query), Some(database)) => Some(GpsFilter {
                query,
                database,
                radius_km: self.settings.gps_radius_km,
            }),
            _ => None,
        };
        if self.settings.use_gps && gps.is_none() {
            return Err(Error::Setting {
                name: "use_gps",
                message: "gps filtering needs query and database coordinates".to_string(),
            });
        }

        let settings = &self.settings;
        let database = self.database;
        let reconstruction = &database.reconstruction;
        let mut timings = QueryTimings::default();
        let mut context = QueryContext::new(image.len(), reconstruction.cameras.len());

        let start = Instant::now();
        let words = matching::assign_words(&self.vocabulary, &image);
        timings.assign = start.elapsed();

        let start = Instant::now();
        matching::match_features(
            &database.assignments,
            &image,
            &words,
            settings.hamming_distance_threshold,
            &mut context,
        )?;
        timings.matching = start.elapsed();

        let start = Instant::now();
        scoring::score_correspondences(&ScoreParameters::from(settings), &mut context);
        voting::cast_votes(reconstruction, settings.ratio_test_threshold, &mut context);
        voting::summarize_votes(reconstruction, settings.score_threshold, &mut context);
        let ranking = voting::rank_cameras(
            reconstruction,
            &context,
            settings.min_evidence,
            settings.evidence_criterion,
            gps.as_ref().filter(|_| settings.use_gps),
        )?;
        timings.voting = start.elapsed();

        let start = Instant::now();
        let parameters = SelectionParameters::from(settings);
        selection::boost_scores(&ranking, &parameters, &mut context);
        let selection = selection::select(&ranking, &context, &image, &parameters);
        timings.selection = start.elapsed();

        let camera_distances_km = gps
            .map(|gps| {
                ranking
                    .iter()
                    .map(|ranked| gps.distance_km(reconstruction.cameras[ranked.camera].id))
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        info!(
            "{} features, {} correspondences, {} ranked images, {} selected and {} potential",
            image.len(),
            context.correspondences.len(),
            ranking.len(),
            selection.primary.len(),
            selection.potential.len()
        );
        self.timings.record(&timings);
        Ok(Some(QueryResult {
            image,
            context,
            ranking,
            selection,
            camera_distances_km,
            timings,
        }))
    }
}
