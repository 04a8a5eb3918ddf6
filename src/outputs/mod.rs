//! Output generation for the intermediate item file and the Atom feed.
//!
//! # Submodules
//!
//! - [`json`]: Writes and reads the raw items handed from `scrape` to `build`
//! - [`atom`]: Serializes the ordered articles into the published feed
//!
//! # Output Structure
//!
//! ```text
//! articles.json   # raw collector output, pretty-printed UTF-8
//! feed.xml        # Atom feed, newest entry first
//! ```

pub mod atom;
pub mod json;
