//! External downloader integration
//!
//! [`ArgumentBuilder`] is the seam between a work item's options and the
//! command line. [`YtDlpArguments`] covers `yt-dlp` and `youtube-dl`;
//! [`find_binary`] locates either of them.

mod traits;
mod ytdlp;

pub use traits::ArgumentBuilder;
pub use ytdlp::{DEFAULT_OUTPUT_TEMPLATE, YtDlpArguments, find_binary};
