use crate::{ChosenBy, LocalizeSettings, QueryResult, Reconstruction};
use std::io::Write;

/// Writes the centered 2D positions of the primary and then the potential correspondences.
///
/// Each set starts with a `query count` line followed by one `x y` line per correspondence.
pub fn write_positions(
    mut writer: impl Write,
    query: usize,
    result: &QueryResult,
) -> std::io::Result<()> {
    for set in [&result.selection.primary, &result.selection.potential] {
        writeln!(writer, "{} {}", query, set.len())?;
        for &id in set {
            let feature = result.context.correspondences[id].feature;
            let position = result.image.features[feature].position;
            writeln!(writer, "{} {}", position.x, position.y)?;
        }
    }
    Ok(())
}

/// Writes the 3D points of the primary and then the potential correspondences.
///
/// Each set starts with a `query count` line followed by one `x y z point` line per
/// correspondence.
pub fn write_correspondences(
    mut writer: impl Write,
    query: usize,
    result: &QueryResult,
    reconstruction: &Reconstruction,
) -> std::io::Result<()> {
    for set in [&result.selection.primary, &result.selection.potential] {
        writeln!(writer, "{} {}", query, set.len())?;
        for &id in set {
            let point = result.context.correspondences[id].point;
            let position = reconstruction.points[point].position;
            writeln!(
                writer,
                "{:.16} {:.16} {:.16} {}",
                position.x, position.y, position.z, point
            )?;
        }
    }
    Ok(())
}

/// Writes the ranking and the votes of the images that form the potential set, that is the
/// top `settings.top_rank_potential` ones.
///
/// With `write_images` unset only the correspondence count of the query is written.
pub fn write_details(
    mut writer: impl Write,
    query: usize,
    result: &QueryResult,
    reconstruction: &Reconstruction,
    settings: &LocalizeSettings,
    write_images: bool,
) -> std::io::Result<()> {
    let context = &result.context;
    let selection = &result.selection;
    writeln!(
        writer,
        "query {} corrs {}",
        query,
        context.correspondences.len()
    )?;
    if !write_images {
        return Ok(());
    }
    for (rank, ranked) in result
        .ranking
        .iter()
        .enumerate()
        .take(settings.top_rank_potential)
    {
        let camera = &reconstruction.cameras[ranked.camera];
        let votes = &context.cameras[ranked.camera];
        let distance = match &result.camera_distances_km {
            Some(distances) => format!("{}", distances[rank] * 1000.0),
            None => "-".to_string(),
        };
        writeln!(
            writer,
            "image -------------------- {} {} {} {} {} rank {}",
            camera.id,
            camera.points.len(),
            votes.probability,
            votes.distinct_words.len(),
            distance,
            rank
        )?;
        for &id in &votes.votes {
            let correspondence = &context.correspondences[id];
            let bin = selection.assigned_bin[id].map_or("-".to_string(), |bin| bin.to_string());
            let chosen = match selection.chosen[id] {
                None => 0,
                Some(ChosenBy::Direct) => 1,
                Some(ChosenBy::Backfill) => 2,
            };
            writeln!(
                writer,
                "{} {} {} {} {} {} {} {} {} {}",
                correspondence.distance,
                correspondence.feature,
                context.point_stats(correspondence.point).count,
                context.feature_stats[correspondence.feature].count,
                correspondence.score,
                correspondence.boosted_score,
                correspondence.point,
                correspondence.bucket_size,
                bin,
                chosen
            )?;
        }
    }
    Ok(())
}
