// User sample library - Folder tree of imported samples
//
// Files carry their audio inline as data URLs so a project file is
// self-contained. Sample references in patterns are re-resolved against this
// tree by name when a project is loaded.

use crate::sampler::data_url::{DataUrl, mime_for_extension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SampleNode {
    File {
        id: String,
        name: String,
        #[serde(rename = "dataUrl")]
        data_url: String,
        #[serde(rename = "isFavorite", default, skip_serializing_if = "is_false")]
        is_favorite: bool,
    },
    Folder {
        id: String,
        name: String,
        #[serde(default)]
        children: Vec<SampleNode>,
        #[serde(rename = "isFavorite", default, skip_serializing_if = "is_false")]
        is_favorite: bool,
    },
}

impl SampleNode {
    pub fn file(name: impl Into<String>, data_url: impl Into<String>) -> Self {
        SampleNode::File {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            data_url: data_url.into(),
            is_favorite: false,
        }
    }

    /// File node from raw file bytes, mime type guessed from the name
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let extension = name.rsplit_once('.').map_or("", |(_, ext)| ext);
        let url = DataUrl::new(mime_for_extension(extension), bytes).encode();
        Self::file(name, url)
    }

    pub fn folder(name: impl Into<String>, children: Vec<SampleNode>) -> Self {
        SampleNode::Folder {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            children,
            is_favorite: false,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SampleNode::File { id, .. } | SampleNode::Folder { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SampleNode::File { name, .. } | SampleNode::Folder { name, .. } => name,
        }
    }

    pub fn is_favorite(&self) -> bool {
        match self {
            SampleNode::File { is_favorite, .. } | SampleNode::Folder { is_favorite, .. } => *is_favorite,
        }
    }

    pub fn set_favorite(&mut self, favorite: bool) {
        match self {
            SampleNode::File { is_favorite, .. } | SampleNode::Folder { is_favorite, .. } => {
                *is_favorite = favorite
            }
        }
    }
}

/// Depth-first search for the first file named `name`; returns its data URL
pub fn find_by_name<'a>(nodes: &'a [SampleNode], name: &str) -> Option<&'a str> {
    nodes.iter().find_map(|node| match node {
        SampleNode::File {
            name: file_name,
            data_url,
            ..
        } if file_name == name => Some(data_url.as_str()),
        SampleNode::File { .. } => None,
        SampleNode::Folder { children, .. } => find_by_name(children, name),
    })
}

/// Every file in the tree as (name, data URL), depth first
pub fn files(nodes: &[SampleNode]) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    collect_files(nodes, &mut out);
    out
}

fn collect_files<'a>(nodes: &'a [SampleNode], out: &mut Vec<(&'a str, &'a str)>) {
    for node in nodes {
        match node {
            SampleNode::File { name, data_url, .. } => out.push((name.as_str(), data_url.as_str())),
            SampleNode::Folder { children, .. } => collect_files(children, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Vec<SampleNode> {
        vec![
            SampleNode::file("kick.wav", "data:audio/wav;base64,AA=="),
            SampleNode::folder(
                "Loops",
                vec![
                    SampleNode::folder("Deep", vec![SampleNode::file("pad.wav", "data:audio/wav;base64,AQ==")]),
                    SampleNode::file("break.wav", "data:audio/wav;base64,Ag=="),
                ],
            ),
        ]
    }

    #[test]
    fn test_find_by_name_recurses() {
        let nodes = tree();
        assert_eq!(find_by_name(&nodes, "pad.wav"), Some("data:audio/wav;base64,AQ=="));
        assert_eq!(find_by_name(&nodes, "kick.wav"), Some("data:audio/wav;base64,AA=="));
        assert_eq!(find_by_name(&nodes, "Loops"), None);
        assert_eq!(find_by_name(&nodes, "missing.wav"), None);
        assert_eq!(files(&nodes).len(), 3);
    }

    #[test]
    fn test_json_shape() {
        let mut node = SampleNode::file("kick.wav", "data:audio/wav;base64,AA==");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["dataUrl"], "data:audio/wav;base64,AA==");
        assert!(json.get("isFavorite").is_none());

        node.set_favorite(true);
        let json = serde_json::to_string(&node).unwrap();
        let back: SampleNode = serde_json::from_str(&json).unwrap();
        assert!(back.is_favorite());
        assert_eq!(back, node);

        let folder: SampleNode =
            serde_json::from_str(r#"{"id":"f1","type":"folder","name":"Drums","children":[]}"#).unwrap();
        assert_eq!(folder.name(), "Drums");
        assert_eq!(folder.id(), "f1");
    }

    #[test]
    fn test_from_bytes_guesses_mime() {
        let node = SampleNode::from_bytes("snare.mp3", vec![0xff]);
        match node {
            SampleNode::File { data_url, .. } => assert!(data_url.starts_with("data:audio/mpeg;base64,")),
            SampleNode::Folder { .. } => panic!("expected a file"),
        }
    }
}
