//! Fixed operation table.
//!
//! Every operation the bridge exposes maps to a (module, callable) pair in
//! the bundled analysis code, with an ordered set of argument roles, the
//! payload shape its channel contract promises, and the wire error code its
//! failures carry. The table is fixed at compile time; there is no runtime
//! registration.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// The two logical channels exposed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    ImageAnalyzer,
    InstagramDownloader,
}

impl ChannelId {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelId::ImageAnalyzer => "picsense/image_analyzer",
            ChannelId::InstagramDownloader => "picsense/instagram_downloader",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "picsense/image_analyzer" => Some(ChannelId::ImageAnalyzer),
            "picsense/instagram_downloader" => Some(ChannelId::InstagramDownloader),
            _ => None,
        }
    }
}

/// Shape of a successful reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// The callable's stringified return value, as-is.
    Text,
    /// The two-tier color-style contract: a mapping carrying the raw JSON
    /// plus a domain-level success flag.
    Wrapped,
}

/// A bridge operation bound to a Python callable.
#[derive(Debug)]
pub struct Operation {
    pub name: &'static str,
    pub channel: ChannelId,
    pub module: &'static str,
    pub callable: &'static str,
    /// Argument roles in the order the callable takes them. All required.
    pub arg_roles: &'static [&'static str],
    pub shape: PayloadShape,
    /// Wire code for invocation failures of this operation.
    pub error_code: &'static str,
}

pub const OPERATIONS: &[Operation] = &[
    Operation {
        name: "analyzeImage",
        channel: ChannelId::ImageAnalyzer,
        module: "analyze_layout",
        callable: "analyze_single_image",
        arg_roles: &["imagePath"],
        shape: PayloadShape::Text,
        error_code: "ANALYSIS_ERROR",
    },
    Operation {
        name: "analyzeColorStyle",
        channel: ChannelId::ImageAnalyzer,
        module: "color_style_infer",
        callable: "analyze_color_style",
        arg_roles: &["imagePath"],
        shape: PayloadShape::Wrapped,
        error_code: "PYTHON_ERROR",
    },
    Operation {
        name: "downloadInstagramImage",
        channel: ChannelId::InstagramDownloader,
        module: "instagram_downloader",
        callable: "download_instagram_image",
        arg_roles: &["url", "outputDir"],
        shape: PayloadShape::Text,
        error_code: "DOWNLOAD_ERROR",
    },
];

static INDEX: Lazy<HashMap<&'static str, &'static Operation>> =
    Lazy::new(|| OPERATIONS.iter().map(|op| (op.name, op)).collect());

/// Look up an operation by channel and name.
///
/// `None` means the host gets the "not implemented" reply.
pub fn resolve(channel: ChannelId, name: &str) -> Option<&'static Operation> {
    INDEX
        .get(name)
        .copied()
        .filter(|op| op.channel == channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_every_registered_operation() {
        for op in OPERATIONS {
            let resolved = resolve(op.channel, op.name).unwrap();
            assert_eq!(resolved.module, op.module);
            assert_eq!(resolved.callable, op.callable);
        }
    }

    #[test]
    fn unknown_name_is_unresolved() {
        assert!(resolve(ChannelId::ImageAnalyzer, "transmogrify").is_none());
    }

    #[test]
    fn operations_do_not_cross_channels() {
        assert!(resolve(ChannelId::InstagramDownloader, "analyzeImage").is_none());
        assert!(resolve(ChannelId::ImageAnalyzer, "downloadInstagramImage").is_none());
    }

    #[test]
    fn channel_names_round_trip() {
        for channel in [ChannelId::ImageAnalyzer, ChannelId::InstagramDownloader] {
            assert_eq!(ChannelId::from_name(channel.name()), Some(channel));
        }
        assert_eq!(ChannelId::from_name("picsense/unknown"), None);
    }
}
