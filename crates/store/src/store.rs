use crate::error::StoreError;
use crate::migration;
use amphigory_core::{
    AudioStream, ClassificationLabel, Confidence, Disc, MediumKind, SubtitleStream, Track,
    TrackStatus,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// Owned, single-connection handle onto the metadata database.
pub struct MetadataStore {
    conn: Connection,
}

/// A disc/tracks pair as returned by [`MetadataStore::get_disc_with_tracks`].
pub struct DiscWithTracks {
    pub disc: Disc,
    pub tracks: Vec<Track>,
}

/// A row in the library listing (spec §4.4 `list_discs`).
#[derive(Debug, Clone, PartialEq)]
pub struct DiscSummary {
    pub fingerprint: String,
    pub title: Option<String>,
    pub medium: MediumKind,
    pub track_count: u32,
    pub complete_track_count: u32,
}

/// Filter for [`MetadataStore::list_discs`]. All fields are `AND`-combined;
/// `None` means "don't filter on this dimension".
#[derive(Debug, Clone, Default)]
pub struct DiscFilter {
    pub status: Option<TrackStatus>,
    pub medium: Option<MediumKind>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DiscUpdate {
    pub title: Option<String>,
    pub year: Option<u32>,
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TrackUpdate {
    pub output_filename: Option<String>,
    pub preset_name: Option<String>,
    pub ripped_path: Option<PathBuf>,
    pub transcoded_path: Option<PathBuf>,
    pub inserted_path: Option<PathBuf>,
    pub status: Option<TrackStatus>,
    pub classification: Option<ClassificationLabel>,
    pub classification_confidence: Option<Confidence>,
    pub classification_score: Option<f64>,
}

impl MetadataStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        migration::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Disc>, StoreError> {
        self.conn
            .query_row(
                "SELECT fingerprint, title, year, external_id, medium, scan_snapshot,
                        needs_reprocessing, reprocessing_type, reprocessing_notes,
                        created_at, scanned_at
                 FROM discs WHERE fingerprint = ?1",
                params![fingerprint],
                row_to_disc,
            )
            .optional()
            .map_err(StoreError::from)
    }

    pub fn get_disc_with_tracks(
        &self,
        fingerprint: &str,
    ) -> Result<Option<DiscWithTracks>, StoreError> {
        let Some(disc) = self.get_by_fingerprint(fingerprint)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT disc_fingerprint, track_number, duration_secs, size_bytes, resolution,
                    chapters, audio_streams, subtitle_streams, status, segment_map,
                    ripped_path, transcoded_path, inserted_path, classification,
                    classification_confidence, classification_score, is_alternate_main,
                    preset_name, output_filename, makemkv_name, is_main_feature_playlist
             FROM tracks WHERE disc_fingerprint = ?1 ORDER BY track_number",
        )?;
        let tracks = stmt
            .query_map(params![fingerprint], row_to_track)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(DiscWithTracks { disc, tracks }))
    }

    /// Upsert the disc row and replace its tracks, inside one transaction
    /// (Invariant 3: rescanning never orphans tracks).
    pub fn save_scan(
        &mut self,
        fingerprint: &str,
        medium: MediumKind,
        scan_snapshot: serde_json::Value,
        tracks: &[Track],
        now: i64,
    ) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO discs (fingerprint, medium, scan_snapshot, created_at, scanned_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(fingerprint) DO UPDATE SET
                medium = excluded.medium,
                scan_snapshot = excluded.scan_snapshot,
                scanned_at = excluded.scanned_at",
            params![
                fingerprint,
                medium_to_str(medium),
                scan_snapshot.to_string(),
                now
            ],
        )?;

        tx.execute(
            "DELETE FROM tracks WHERE disc_fingerprint = ?1",
            params![fingerprint],
        )?;

        for track in tracks {
            insert_track(&tx, track)?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn update_disc_metadata(
        &self,
        fingerprint: &str,
        update: &DiscUpdate,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE discs SET
                title = COALESCE(?2, title),
                year = COALESCE(?3, year),
                external_id = COALESCE(?4, external_id)
             WHERE fingerprint = ?1",
            params![fingerprint, update.title, update.year, update.external_id],
        )?;
        Ok(())
    }

    pub fn update_track(&self, track_id: &str, update: &TrackUpdate) -> Result<(), StoreError> {
        let (fingerprint, track_number) = split_track_id(track_id);
        self.conn.execute(
            "UPDATE tracks SET
                output_filename = COALESCE(?3, output_filename),
                preset_name = COALESCE(?4, preset_name),
                ripped_path = COALESCE(?5, ripped_path),
                transcoded_path = COALESCE(?6, transcoded_path),
                inserted_path = COALESCE(?7, inserted_path),
                status = COALESCE(?8, status),
                classification = COALESCE(?9, classification),
                classification_confidence = COALESCE(?10, classification_confidence),
                classification_score = COALESCE(?11, classification_score)
             WHERE disc_fingerprint = ?1 AND track_number = ?2",
            params![
                fingerprint,
                track_number,
                update.output_filename,
                update.preset_name,
                update.ripped_path.as_ref().map(path_str),
                update.transcoded_path.as_ref().map(path_str),
                update.inserted_path.as_ref().map(path_str),
                update.status.map(status_to_str),
                update.classification.map(classification_to_str),
                update.classification_confidence.map(confidence_to_str),
                update.classification_score,
            ],
        )?;
        Ok(())
    }

    pub fn list_discs(&self, filter: &DiscFilter) -> Result<Vec<DiscSummary>, StoreError> {
        let mut sql = String::from(
            "SELECT d.fingerprint, d.title, d.medium,
                    COUNT(t.track_number) AS track_count,
                    SUM(CASE WHEN t.status = 'complete' THEN 1 ELSE 0 END) AS complete_count
             FROM discs d LEFT JOIN tracks t ON t.disc_fingerprint = d.fingerprint
             WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(medium) = filter.medium {
            sql.push_str(" AND d.medium = ?");
            args.push(Box::new(medium_to_str(medium).to_string()));
        }
        if let Some(search) = &filter.search {
            sql.push_str(" AND d.title LIKE ?");
            args.push(Box::new(format!("%{search}%")));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND d.fingerprint IN (SELECT disc_fingerprint FROM tracks WHERE status = ?)");
            args.push(Box::new(status_to_str(status).to_string()));
        }
        sql.push_str(" GROUP BY d.fingerprint ORDER BY d.fingerprint");

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok(DiscSummary {
                    fingerprint: row.get(0)?,
                    title: row.get(1)?,
                    medium: str_to_medium(&row.get::<_, String>(2)?),
                    track_count: row.get(3)?,
                    complete_track_count: row.get::<_, Option<i64>>(4)?.unwrap_or(0) as u32,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn flag_disc(
        &self,
        fingerprint: &str,
        flag: Option<(&str, &str)>,
    ) -> Result<(), StoreError> {
        match flag {
            Some((reprocessing_type, notes)) => {
                self.conn.execute(
                    "UPDATE discs SET needs_reprocessing = 1, reprocessing_type = ?2, reprocessing_notes = ?3
                     WHERE fingerprint = ?1",
                    params![fingerprint, reprocessing_type, notes],
                )?;
            }
            None => {
                self.conn.execute(
                    "UPDATE discs SET needs_reprocessing = 0, reprocessing_type = NULL, reprocessing_notes = NULL
                     WHERE fingerprint = ?1",
                    params![fingerprint],
                )?;
            }
        }
        Ok(())
    }
}

fn insert_track(tx: &rusqlite::Transaction, track: &Track) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO tracks (
            id, disc_fingerprint, track_number, duration_secs, size_bytes, resolution,
            chapters, audio_streams, subtitle_streams, status, segment_map,
            ripped_path, transcoded_path, inserted_path, makemkv_name,
            classification, classification_confidence, classification_score,
            is_alternate_main, preset_name, output_filename, is_main_feature_playlist
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
        params![
            track.id(),
            track.disc_fingerprint,
            track.track_number,
            track.duration_secs,
            track.size_bytes,
            track.resolution,
            track.chapters,
            serde_json::to_string(&track.audio_streams)?,
            serde_json::to_string(&track.subtitle_streams)?,
            status_to_str(track.status),
            serde_json::to_string(&track.segment_map)?,
            track.ripped_path.as_ref().map(path_str),
            track.transcoded_path.as_ref().map(path_str),
            track.inserted_path.as_ref().map(path_str),
            track.makemkv_name,
            track.classification.map(classification_to_str),
            track.classification_confidence.map(confidence_to_str),
            track.classification_score,
            track.is_alternate_main,
            track.preset_name,
            track.output_filename,
            track.is_main_feature_playlist,
        ],
    )?;
    Ok(())
}

fn row_to_disc(row: &rusqlite::Row) -> rusqlite::Result<Disc> {
    let medium_str: String = row.get(4)?;
    let snapshot_str: String = row.get(5)?;
    Ok(Disc {
        fingerprint: row.get(0)?,
        title: row.get(1)?,
        year: row.get::<_, Option<i64>>(2)?.map(|y| y as u32),
        external_id: row.get(3)?,
        medium: str_to_medium(&medium_str),
        scan_snapshot: serde_json::from_str(&snapshot_str).unwrap_or(serde_json::Value::Null),
        needs_reprocessing: row.get::<_, i64>(6)? != 0,
        reprocessing_type: row.get(7)?,
        reprocessing_notes: row.get(8)?,
        created_at: row.get(9)?,
        scanned_at: row.get(10)?,
    })
}

fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<Track> {
    let audio_json: String = row.get(6)?;
    let subs_json: String = row.get(7)?;
    let status_str: String = row.get(8)?;
    let segment_json: String = row.get(9)?;
    let classification: Option<String> = row.get(13)?;
    let confidence: Option<String> = row.get(14)?;

    Ok(Track {
        disc_fingerprint: row.get(0)?,
        track_number: row.get(1)?,
        duration_secs: row.get::<_, i64>(2)? as u64,
        size_bytes: row.get::<_, i64>(3)? as u64,
        resolution: row.get(4)?,
        chapters: row.get::<_, i64>(5)? as u32,
        audio_streams: serde_json::from_str::<Vec<AudioStream>>(&audio_json).unwrap_or_default(),
        subtitle_streams: serde_json::from_str::<Vec<SubtitleStream>>(&subs_json)
            .unwrap_or_default(),
        status: str_to_status(&status_str),
        classification: classification.as_deref().map(str_to_classification),
        classification_confidence: confidence.as_deref().map(str_to_confidence),
        classification_score: row.get(15)?,
        is_alternate_main: row.get::<_, i64>(16)? != 0,
        segment_map: serde_json::from_str(&segment_json).unwrap_or_default(),
        makemkv_name: row.get(19)?,
        preset_name: row.get(17)?,
        output_filename: row.get(18)?,
        ripped_path: row.get::<_, Option<String>>(10)?.map(PathBuf::from),
        transcoded_path: row.get::<_, Option<String>>(11)?.map(PathBuf::from),
        inserted_path: row.get::<_, Option<String>>(12)?.map(PathBuf::from),
        is_main_feature_playlist: row.get::<_, i64>(20)? != 0,
    })
}

fn split_track_id(id: &str) -> (&str, i64) {
    match id.rsplit_once(':') {
        Some((fp, num)) => (fp, num.parse().unwrap_or(0)),
        None => (id, 0),
    }
}

fn path_str(p: &PathBuf) -> String {
    p.to_string_lossy().into_owned()
}

fn medium_to_str(m: MediumKind) -> &'static str {
    match m {
        MediumKind::Dvd => "dvd",
        MediumKind::Bluray => "bluray",
        MediumKind::Uhd => "uhd",
        MediumKind::Cd => "cd",
    }
}

fn str_to_medium(s: &str) -> MediumKind {
    match s {
        "bluray" => MediumKind::Bluray,
        "uhd" => MediumKind::Uhd,
        "cd" => MediumKind::Cd,
        _ => MediumKind::Dvd,
    }
}

fn status_to_str(s: TrackStatus) -> &'static str {
    match s {
        TrackStatus::Discovered => "discovered",
        TrackStatus::Selected => "selected",
        TrackStatus::Ripping => "ripping",
        TrackStatus::Ripped => "ripped",
        TrackStatus::Transcoding => "transcoding",
        TrackStatus::Transcoded => "transcoded",
        TrackStatus::Inserted => "inserted",
        TrackStatus::Complete => "complete",
    }
}

fn str_to_status(s: &str) -> TrackStatus {
    match s {
        "selected" => TrackStatus::Selected,
        "ripping" => TrackStatus::Ripping,
        "ripped" => TrackStatus::Ripped,
        "transcoding" => TrackStatus::Transcoding,
        "transcoded" => TrackStatus::Transcoded,
        "inserted" => TrackStatus::Inserted,
        "complete" => TrackStatus::Complete,
        _ => TrackStatus::Discovered,
    }
}

fn classification_to_str(c: ClassificationLabel) -> &'static str {
    match c {
        ClassificationLabel::MainFeature => "main_feature",
        ClassificationLabel::Trailers => "trailers",
        ClassificationLabel::Featurettes => "featurettes",
        ClassificationLabel::DeletedScenes => "deleted_scenes",
        ClassificationLabel::Other => "other",
    }
}

fn confidence_to_str(c: Confidence) -> &'static str {
    match c {
        Confidence::High => "high",
        Confidence::Medium => "medium",
        Confidence::Low => "low",
    }
}

fn str_to_classification(s: &str) -> ClassificationLabel {
    match s {
        "main_feature" => ClassificationLabel::MainFeature,
        "trailers" => ClassificationLabel::Trailers,
        "featurettes" => ClassificationLabel::Featurettes,
        "deleted_scenes" => ClassificationLabel::DeletedScenes,
        _ => ClassificationLabel::Other,
    }
}

fn str_to_confidence(s: &str) -> Confidence {
    match s {
        "high" => Confidence::High,
        "medium" => Confidence::Medium,
        _ => Confidence::Low,
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
