//! Segmentation of source documents into embeddable units.
//!
//! Provider profiles are split into overlapping text windows. Catalog records are
//! short and self-contained, so each record becomes exactly one segment.

mod text;

pub use text::{TextChunker, Window};

use crate::documents::{provider_key, Catalog, SourceBody, SourceDocument};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a segment was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    /// A window of a provider profile.
    Policy,
    /// Summary of a district and its dropping points.
    District,
    /// A single dropping point with its fare.
    DroppingPoint,
    /// A provider and the districts it covers.
    Provider,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Policy => "policy",
            SegmentKind::District => "district",
            SegmentKind::DroppingPoint => "dropping_point",
            SegmentKind::Provider => "provider",
        }
    }
}

impl std::str::FromStr for SegmentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "policy" => Ok(SegmentKind::Policy),
            "district" => Ok(SegmentKind::District),
            "dropping_point" => Ok(SegmentKind::DroppingPoint),
            "provider" => Ok(SegmentKind::Provider),
            _ => Err(format!("Unknown segment kind: {}", s)),
        }
    }
}

impl std::fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured attributes used for filtering and display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    /// Canonical provider key, see [`crate::documents::provider_key`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<String>,
    /// Fare in Taka.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<u32>,
}

/// A bounded span of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Identifier of the source document.
    pub source_id: String,
    pub kind: SegmentKind,
    /// Order within the source document.
    pub position: u32,
    pub text: String,
    /// Leading characters shared with the previous segment of the same source.
    pub overlap: usize,
    pub metadata: SegmentMetadata,
}

impl Segment {
    /// Stable key of this segment: `{source_id}#{position}`.
    pub fn key(&self) -> String {
        format!("{}#{}", self.source_id, self.position)
    }

    /// Index entry identifier derived from [`Segment::key`], identical across ingestion runs.
    pub fn entry_id(&self) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, self.key().as_bytes())
    }

    /// Text handed to the embedder. Policy windows are prefixed with their provider so
    /// a window that never names the provider still lands near questions about it.
    pub fn embedding_input(&self) -> String {
        match self.kind {
            SegmentKind::Policy => format!("Policy of {} bus:\n{}", self.source_id, self.text),
            _ => self.text.clone(),
        }
    }

    /// Short human-readable label, e.g. "hanif policy #2".
    pub fn label(&self) -> String {
        match self.kind {
            SegmentKind::Policy => format!("{} policy #{}", self.source_id, self.position),
            SegmentKind::District => format!(
                "district {}",
                self.metadata.district.as_deref().unwrap_or("?")
            ),
            SegmentKind::DroppingPoint => format!(
                "{} / {}",
                self.metadata.district.as_deref().unwrap_or("?"),
                self.metadata.point.as_deref().unwrap_or("?")
            ),
            SegmentKind::Provider => format!(
                "provider {}",
                self.metadata.provider.as_deref().unwrap_or("?")
            ),
        }
    }
}

/// Rebuild a document's text from its segments (in position order) by dropping overlaps.
pub fn reassemble(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.chars().skip(s.overlap).collect::<String>())
        .collect()
}

/// Split a source document into segments.
pub fn segment_document(doc: &SourceDocument, chunker: &TextChunker) -> Vec<Segment> {
    match &doc.body {
        SourceBody::Text(text) => chunker
            .split(text)
            .into_iter()
            .enumerate()
            .map(|(position, window)| Segment {
                source_id: doc.id.clone(),
                kind: SegmentKind::Policy,
                position: position as u32,
                text: window.text,
                overlap: window.overlap,
                metadata: SegmentMetadata {
                    provider: Some(provider_key(&doc.id)),
                    ..Default::default()
                },
            })
            .collect(),
        SourceBody::Catalog(catalog) => catalog_segments(&doc.id, catalog),
    }
}

fn catalog_segments(source_id: &str, catalog: &Catalog) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut push = |kind: SegmentKind, text: String, metadata: SegmentMetadata| {
        let position = segments.len() as u32;
        segments.push(Segment {
            source_id: source_id.to_string(),
            kind,
            position,
            text,
            overlap: 0,
            metadata,
        });
    };

    for district in &catalog.districts {
        let mut summary = format!("District: {}\nDropping points:\n", district.name);
        for point in &district.dropping_points {
            summary.push_str(&format!("• {} — {} Taka\n", point.name, point.price));
        }
        push(
            SegmentKind::District,
            summary,
            SegmentMetadata {
                district: Some(district.name.clone()),
                ..Default::default()
            },
        );

        for point in &district.dropping_points {
            push(
                SegmentKind::DroppingPoint,
                format!(
                    "Dropping point: {} in {}.\nFare: {} Taka.",
                    point.name, district.name, point.price
                ),
                SegmentMetadata {
                    district: Some(district.name.clone()),
                    point: Some(point.name.clone()),
                    price: Some(point.price),
                    ..Default::default()
                },
            );
        }
    }

    for provider in &catalog.bus_providers {
        push(
            SegmentKind::Provider,
            format!(
                "Bus Provider: {}\nCoverage Districts: {}",
                provider.name,
                provider.coverage_districts.join(", ")
            ),
            SegmentMetadata {
                provider: Some(provider_key(&provider.name)),
                ..Default::default()
            },
        );
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{District, DroppingPoint, Provider};

    fn sample_catalog() -> Catalog {
        Catalog {
            districts: vec![District {
                name: "Rajshahi".to_string(),
                dropping_points: vec![
                    DroppingPoint {
                        name: "Shaheb Bazar".to_string(),
                        price: 450,
                    },
                    DroppingPoint {
                        name: "Rail Gate".to_string(),
                        price: 480,
                    },
                ],
            }],
            bus_providers: vec![Provider {
                name: "Desh Travel".to_string(),
                coverage_districts: vec!["Dhaka".to_string(), "Rajshahi".to_string()],
            }],
        }
    }

    #[test]
    fn test_catalog_records() {
        let chunker = TextChunker::new(500, 150).unwrap();
        let segments = segment_document(&SourceDocument::catalog(sample_catalog()), &chunker);

        let kinds: Vec<SegmentKind> = segments.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::District,
                SegmentKind::DroppingPoint,
                SegmentKind::DroppingPoint,
                SegmentKind::Provider,
            ]
        );
        assert!(segments[0].text.contains("• Shaheb Bazar — 450 Taka"));
        assert_eq!(segments[2].metadata.price, Some(480));
        assert_eq!(segments[3].metadata.provider.as_deref(), Some("deshtravel"));
        assert_eq!(segments[3].text, "Bus Provider: Desh Travel\nCoverage Districts: Dhaka, Rajshahi");

        let positions: Vec<u32> = segments.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_profile_segments_cover_text() {
        let text = "Hanif Enterprise runs daily coaches from Dhaka to Rajshahi. \
                    Tickets are refundable until six hours before departure. \
                    Hotline: 01713-049530. Head office: Kallyanpur, Dhaka.";
        let doc = SourceDocument::profile("Hanif", text);
        let chunker = TextChunker::new(60, 15).unwrap();

        let segments = segment_document(&doc, &chunker);

        assert!(segments.len() > 1);
        assert!(segments.iter().all(|s| s.kind == SegmentKind::Policy));
        assert!(segments.iter().all(|s| s.metadata.provider.as_deref() == Some("hanif")));
        assert_eq!(reassemble(&segments), text);
    }

    #[test]
    fn test_entry_id_is_stable() {
        let doc = SourceDocument::profile("Ena", "Ena Transport policy text");
        let chunker = TextChunker::new(500, 150).unwrap();

        let first = segment_document(&doc, &chunker);
        let second = segment_document(&doc, &chunker);

        assert_eq!(first[0].entry_id(), second[0].entry_id());
        assert_eq!(first[0].key(), "ena#0");
        assert!(first[0].embedding_input().starts_with("Policy of ena bus:"));
    }

    #[test]
    fn test_profile_and_catalog_share_provider_key() {
        let chunker = TextChunker::new(500, 150).unwrap();
        let profile = segment_document(&SourceDocument::profile("desh_travel", "Refunds until noon"), &chunker);
        let catalog = segment_document(&SourceDocument::catalog(sample_catalog()), &chunker);

        assert_eq!(profile[0].source_id, "desh travel");
        assert_eq!(profile[0].metadata.provider, catalog[3].metadata.provider);
        assert!(profile[0].embedding_input().starts_with("Policy of desh travel bus:"));
    }

    #[test]
    fn test_segment_kind_round_trip_names() {
        for kind in [
            SegmentKind::Policy,
            SegmentKind::District,
            SegmentKind::DroppingPoint,
            SegmentKind::Provider,
        ] {
            assert_eq!(kind.as_str().parse::<SegmentKind>().unwrap(), kind);
        }
    }
}
