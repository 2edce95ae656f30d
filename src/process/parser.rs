//! Parser for the downloader's stdout protocol
//!
//! The tool prints one human-oriented line per event. Lines are classified by
//! their leading tag (`[download]`, `[hlsnative]`, `[ffmpeg]`, a JSON object, …)
//! and by tokens at fixed or searchable positions. The protocol is not
//! versioned; anything unrecognised degrades to the default phase instead of
//! failing.

use crate::types::{DlStat, MediaFile, StatusTag, VideoMetadata};
use crate::utils::{is_format_fragment, split_media_path};

/// Something the adapter must do in response to a line
#[derive(Debug, Clone, PartialEq)]
pub enum LineAction {
    /// A new file finished downloading
    ConfirmDownloaded(MediaFile),
    /// A merge or conversion produced the final file for the current item
    ConfirmPostProcessed(MediaFile),
    /// The tool skipped a file that was already on disk
    ConfirmExisting(MediaFile),
    /// A simulated run reported one item's metadata
    ConfirmSimulated {
        /// Parsed metadata fields
        metadata: Box<VideoMetadata>,
        /// The complete JSON object, for the metadata side-file
        raw: serde_json::Value,
    },
    /// The tool started enumerating a container for a single-item target
    ContainerInSingleTarget,
    /// A line looked like JSON but did not parse
    InvalidJson(String),
}

/// Result of parsing one stdout line
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// Snapshot fields this line carries
    pub stat: DlStat,
    /// Follow-up the adapter must perform
    pub action: Option<LineAction>,
}

impl ParsedLine {
    fn new(stat: DlStat) -> Self {
        Self { stat, action: None }
    }
}

/// Per-run stdout parser state
///
/// Holds the destination announced by the most recent `Destination:` line until
/// the matching completion line arrives, and the running item counters.
#[derive(Debug, Clone, Default)]
pub struct StdoutParser {
    single_target: bool,
    simulated: bool,
    pending: Option<MediaFile>,
    current_index: Option<u32>,
    total_count: Option<u32>,
}

impl StdoutParser {
    /// Create a parser for one run
    ///
    /// `single_target` is set when the work item is a single media item rather
    /// than a container.
    pub fn new(single_target: bool, simulated: bool) -> Self {
        Self {
            single_target,
            simulated,
            ..Default::default()
        }
    }

    /// Index of the item currently being processed inside a container
    pub fn current_index(&self) -> Option<u32> {
        self.current_index
    }

    /// Number of items in the container, as far as known
    pub fn total_count(&self) -> Option<u32> {
        self.total_count
    }

    /// Destination waiting for its completion line
    pub fn pending(&self) -> Option<&MediaFile> {
        self.pending.as_ref()
    }

    /// Parse one line of stdout
    pub fn parse(&mut self, line: &str) -> ParsedLine {
        let line = line.trim_start_matches('\r');
        let mut stat = DlStat::with_status(StatusTag::PreProcessing);
        stat.simulated = self.simulated;

        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first().copied() else {
            return ParsedLine::new(stat);
        };

        match first {
            "[download]" => self.parse_download(tokens, stat),
            "[hlsnative]" => Self::parse_hlsnative(&tokens, stat),
            "[ffmpeg]" | "[Merger]" => self.parse_postprocess(&tokens, stat),
            _ if first.starts_with('{') => self.parse_json(line, stat),
            // Any other tag, debug output and untagged text fall back to pre-processing
            _ => ParsedLine::new(stat),
        }
    }

    fn parse_download(&mut self, mut tokens: Vec<&str>, mut stat: DlStat) -> ParsedLine {
        stat.status = StatusTag::Downloading;
        let mut action = None;

        if tokens.get(1) == Some(&"Destination:") && tokens.len() > 2 {
            let file = split_media_path(&tokens[2..].join(" "));
            stat.set_file(&file);
            self.pending = Some(file);
        }

        if let Some(progress) = tokens.get(1)
            && progress.ends_with('%')
        {
            let percent = progress.trim_end_matches('%').parse::<f32>().ok();
            stat.filesize = value_after(&tokens, "of");
            if percent.is_some_and(|p| p < 100.0) {
                stat.percent = percent;
                stat.speed = value_after(&tokens, "at");
                stat.eta = value_after(&tokens, "ETA");
            } else if percent.is_some() {
                stat.percent = Some(100.0);
                // "100% of SIZE in TIME" marks the end of a file; fragments that
                // are about to be merged don't count
                if value_after(&tokens, "in").is_some()
                    && self
                        .pending
                        .as_ref()
                        .is_some_and(|file| !is_format_fragment(&file.filename))
                    && let Some(file) = self.pending.take()
                {
                    stat.set_file(&file);
                    action = Some(LineAction::ConfirmDownloaded(file));
                }
            }
        }

        if tokens.len() >= 6
            && tokens[1] == "Downloading"
            && matches!(tokens[2], "video" | "item")
            && tokens[4] == "of"
        {
            if let (Ok(index), Ok(total)) = (tokens[3].parse::<u32>(), tokens[5].parse::<u32>()) {
                self.current_index = Some(index);
                self.total_count = Some(total);
                stat.current_index = Some(index);
                stat.total_count = Some(total);
            }
            if self.single_target {
                action = Some(LineAction::ContainerInSingleTarget);
            }
        }

        let len = tokens.len();
        if len >= 4 && tokens[len - 3] == "downloaded" && tokens[len - 1] == "merged" {
            tokens.truncate(len - 2);
            stat.percent = Some(100.0);
        }

        let len = tokens.len();
        if len >= 6 && tokens[len - 1] == "downloaded" && tokens[len - 4] == "has" {
            let file = split_media_path(&tokens[1..len - 4].join(" "));
            stat.set_file(&file);
            stat.status = StatusTag::AlreadyDownloaded;
            self.pending = None;
            action = Some(LineAction::ConfirmExisting(file));
        }

        if tokens.last() == Some(&"Aborting.") {
            stat.status = StatusTag::FilesizeAbort;
        }

        ParsedLine { stat, action }
    }

    fn parse_hlsnative(tokens: &[&str], mut stat: DlStat) -> ParsedLine {
        stat.status = StatusTag::Downloading;
        if tokens.len() == 7
            && let (Ok(current), Ok(total)) = (tokens[4].parse::<f64>(), tokens[6].parse::<f64>())
            && total > 0.0
        {
            let percent = (current / total * 1000.0).round() / 10.0;
            stat.percent = Some(percent as f32);
        }
        ParsedLine::new(stat)
    }

    fn parse_postprocess(&mut self, tokens: &[&str], mut stat: DlStat) -> ParsedLine {
        stat.status = StatusTag::PostProcessing;

        let target = match tokens.get(1).copied() {
            // [ffmpeg] Merging formats into "PATH"
            Some("Merging") if tokens.len() > 4 => Some(tokens[4..].join(" ")),
            // [ffmpeg] Destination: PATH
            Some("Destination:") if tokens.len() > 2 => Some(tokens[2..].join(" ")),
            // [ffmpeg] Converting ...; Destination: PATH
            Some("Converting") => tokens
                .iter()
                .position(|t| t.ends_with("Destination:"))
                .filter(|&i| i + 1 < tokens.len())
                .map(|i| tokens[i + 1..].join(" ")),
            _ => None,
        };

        let mut parsed = ParsedLine::new(stat);
        if let Some(target) = target {
            let file = split_media_path(&target);
            parsed.stat.set_file(&file);
            self.pending = None;
            parsed.action = Some(LineAction::ConfirmPostProcessed(file));
        }
        parsed
    }

    fn parse_json(&mut self, line: &str, mut stat: DlStat) -> ParsedLine {
        let parsed = serde_json::from_str::<serde_json::Value>(line).and_then(|raw| {
            let metadata = serde_json::from_value::<VideoMetadata>(raw.clone())?;
            Ok((raw, metadata))
        });

        match parsed {
            Ok((raw, metadata)) => {
                let index = self.current_index.unwrap_or(0) + 1;
                let total = self.total_count.unwrap_or(0) + 1;
                self.current_index = Some(index);
                self.total_count = Some(total);

                stat.status = StatusTag::Checking;
                stat.simulated = true;
                stat.current_index = Some(index);
                stat.total_count = Some(total);
                if let Some(name) = metadata.filename.as_deref() {
                    stat.set_file(&split_media_path(name));
                }

                ParsedLine {
                    stat,
                    action: Some(LineAction::ConfirmSimulated {
                        metadata: Box::new(metadata),
                        raw,
                    }),
                }
            }
            Err(e) => ParsedLine {
                stat,
                action: Some(LineAction::InvalidJson(e.to_string())),
            },
        }
    }
}

/// Token following `key`, skipping the `~` the tool prints before estimates
fn value_after(tokens: &[&str], key: &str) -> Option<String> {
    let index = tokens.iter().position(|t| *t == key)?;
    tokens[index + 1..]
        .iter()
        .find(|t| **t != "~")
        .map(|t| t.to_string())
}
