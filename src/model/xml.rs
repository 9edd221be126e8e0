//! OpenCV Haar-cascade XML parsing.
//!
//! Reads `opencv_storage/cascade` documents and flattens them into the
//! numeric layout of [`super::Cascade`]. Text nodes hold whitespace-separated
//! numeric tokens; every token is coerced individually and any failure
//! aborts the load without partial output.

use roxmltree::{Document, Node};

use super::Cascade;
use crate::error::{Error, Result};

struct Feature {
    rects: Vec<[f64; 5]>,
    tilted: Option<bool>,
}

pub(super) fn parse(document: &str) -> Result<Cascade> {
    let doc = Document::parse(document)?;
    let root = doc.root_element();
    let cascade = if root.has_tag_name("cascade") {
        root
    } else {
        required_child(root, "cascade")?
    };

    let window_width = read_number_child(cascade, "width")?;
    let window_height = read_number_child(cascade, "height")?;

    let features = parse_features(required_child(cascade, "features")?)?;

    let mut flat = vec![window_width, window_height];
    let stages = required_child(cascade, "stages")?;
    for stage in element_children(stages) {
        let stage_threshold = read_number_child(stage, "stageThreshold")?;
        let weak_nodes: Vec<Node> =
            element_children(required_child(stage, "weakClassifiers")?).collect();
        if weak_nodes.is_empty() {
            return Err(Error::InvalidCascade("stage with no weak classifiers".into()));
        }

        flat.push(stage_threshold);
        flat.push(weak_nodes.len() as f64);

        for weak in weak_nodes {
            let internal = read_tokens_child(weak, "internalNodes")?;
            if internal.len() < 4 {
                return Err(Error::InvalidCascade(format!(
                    "internalNodes holds {} tokens, expected 4",
                    internal.len()
                )));
            }
            let leaves = read_tokens_child(weak, "leafValues")?;
            if leaves.len() < 2 {
                return Err(Error::InvalidCascade(format!(
                    "leafValues holds {} tokens, expected 2",
                    leaves.len()
                )));
            }

            let feature_index = internal[2];
            if feature_index < 0.0
                || feature_index.fract() != 0.0
                || feature_index as usize >= features.len()
            {
                return Err(Error::InvalidCascade(format!(
                    "feature index {feature_index} out of range ({} features)",
                    features.len()
                )));
            }
            let feature = &features[feature_index as usize];
            let node_threshold = internal[3];

            // The feature-level <tilted> element wins; the first
            // internalNodes token is the fallback for files without it.
            let tilted = feature.tilted.unwrap_or(internal[0] != 0.0);

            flat.push(if tilted { 1.0 } else { 0.0 });
            flat.push(feature.rects.len() as f64);
            for rect in &feature.rects {
                flat.extend_from_slice(rect);
            }
            flat.push(node_threshold);
            flat.push(leaves[0]);
            flat.push(leaves[1]);
        }
    }

    Cascade::from_flat(flat)
}

fn parse_features(features: Node) -> Result<Vec<Feature>> {
    let mut parsed = Vec::new();
    for feature in element_children(features) {
        let rects_node = required_child(feature, "rects")?;
        let mut rects = Vec::new();
        for rect in element_children(rects_node) {
            let tokens = read_tokens(rect)?;
            if tokens.len() != 5 {
                return Err(Error::InvalidCascade(format!(
                    "feature rectangle holds {} tokens, expected 5",
                    tokens.len()
                )));
            }
            rects.push([tokens[0], tokens[1], tokens[2], tokens[3], tokens[4]]);
        }
        if rects.is_empty() {
            return Err(Error::InvalidCascade("feature with no rectangles".into()));
        }

        let tilted = match child(feature, "tilted") {
            Some(node) => {
                let tokens = read_tokens(node)?;
                match tokens.as_slice() {
                    [flag] => Some(*flag != 0.0),
                    _ => {
                        return Err(Error::InvalidCascade(
                            "tilted flag must be a single number".into(),
                        ))
                    }
                }
            }
            None => None,
        };

        parsed.push(Feature { rects, tilted });
    }

    if parsed.is_empty() {
        return Err(Error::InvalidCascade("cascade has no features".into()));
    }
    Ok(parsed)
}

fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
}

fn required_child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>> {
    child(node, name)
        .ok_or_else(|| Error::InvalidCascade(format!("missing <{name}> element")))
}

fn read_tokens(node: Node) -> Result<Vec<f64>> {
    let text = node.text().unwrap_or("");
    let mut values = Vec::new();
    for token in text.split_whitespace() {
        let value: f64 = token.parse().map_err(|_| {
            Error::InvalidCascade(format!(
                "non-numeric token {token:?} in <{}>",
                node.tag_name().name()
            ))
        })?;
        values.push(value);
    }
    Ok(values)
}

fn read_tokens_child(node: Node, name: &str) -> Result<Vec<f64>> {
    read_tokens(required_child(node, name)?)
}

fn read_number_child(node: Node, name: &str) -> Result<f64> {
    let tokens = read_tokens_child(node, name)?;
    match tokens.as_slice() {
        [value] => Ok(*value),
        _ => Err(Error::InvalidCascade(format!(
            "<{name}> must hold a single number"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>20</height>
  <width>20</width>
  <stages>
    <_>
      <maxWeakCount>2</maxWeakCount>
      <stageThreshold>-1.25</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>0 -1 0 4.0e-02</internalNodes>
          <leafValues>0.83 -0.91</leafValues>
        </_>
        <_>
          <internalNodes>0 -1 1 -2.1e-02</internalNodes>
          <leafValues>-0.77 0.64</leafValues>
        </_>
      </weakClassifiers>
    </_>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.5</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>1 -1 2 1.0e-01</internalNodes>
          <leafValues>0.5 -0.5</leafValues>
        </_>
      </weakClassifiers>
    </_>
  </stages>
  <features>
    <_>
      <rects>
        <_>3 7 14 4 -1.</_>
        <_>3 9 14 2 2.</_>
      </rects>
      <tilted>0</tilted>
    </_>
    <_>
      <rects>
        <_>1 1 4 4 -1.</_>
        <_>1 1 2 4 2.</_>
        <_>3 1 2 4 2.</_>
      </rects>
      <tilted>0</tilted>
    </_>
    <_>
      <rects>
        <_>5 5 6 3 -1.</_>
        <_>5 6 6 1 3.</_>
      </rects>
      <tilted>1</tilted>
    </_>
  </features>
</cascade>
</opencv_storage>
"#;

    #[test]
    fn parses_small_cascade() {
        let cascade = Cascade::from_xml(SMALL_CASCADE).unwrap();
        assert_eq!(cascade.window_width(), 20);
        assert_eq!(cascade.window_height(), 20);
        assert_eq!(cascade.stage_count(), 2);

        let data = cascade.data();
        assert_eq!(data[0], 20.0);
        assert_eq!(data[1], 20.0);

        // 2 + sum over stages of (2 + weakCount * (2 + 5 * rectCount + 3)):
        // stage 1: 2 + (2 + 10 + 3) + (2 + 15 + 3), stage 2: 2 + (2 + 10 + 3).
        let expected_len = 2 + (2 + 15 + 20) + (2 + 15);
        assert_eq!(data.len(), expected_len);

        // First weak classifier of the first stage.
        assert_eq!(data[2], -1.25);
        assert_eq!(data[3], 2.0);
        assert_eq!(data[4], 0.0); // not tilted
        assert_eq!(data[5], 2.0); // rect count
        assert_eq!(&data[6..11], &[3.0, 7.0, 14.0, 4.0, -1.0]);

        // The second stage's only weak classifier uses the tilted feature.
        let stage2 = 2 + (2 + 15 + 20);
        assert_eq!(data[stage2], 0.5);
        assert_eq!(data[stage2 + 1], 1.0);
        assert_eq!(data[stage2 + 2], 1.0); // tilted
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(Cascade::from_xml("<opencv_storage><cascade>").is_err());
    }

    #[test]
    fn missing_width_is_rejected() {
        let doc = SMALL_CASCADE.replace("<width>20</width>", "");
        assert!(matches!(
            Cascade::from_xml(&doc),
            Err(Error::InvalidCascade(_))
        ));
    }

    #[test]
    fn non_numeric_token_is_rejected() {
        let doc = SMALL_CASCADE.replace("0.83 -0.91", "0.83 oops");
        assert!(matches!(
            Cascade::from_xml(&doc),
            Err(Error::InvalidCascade(_))
        ));
    }

    #[test]
    fn feature_index_out_of_range_is_rejected() {
        let doc = SMALL_CASCADE.replace("1 -1 2 1.0e-01", "1 -1 9 1.0e-01");
        assert!(matches!(
            Cascade::from_xml(&doc),
            Err(Error::InvalidCascade(_))
        ));
    }

    #[test]
    fn tilted_element_wins_over_internal_node_token() {
        // internalNodes starts with 1 but the feature says tilted = 0.
        let doc = SMALL_CASCADE.replace(
            "<internalNodes>1 -1 2 1.0e-01</internalNodes>",
            "<internalNodes>1 -1 0 1.0e-01</internalNodes>",
        );
        let cascade = Cascade::from_xml(&doc).unwrap();
        let stage2 = 2 + (2 + 15 + 20);
        assert_eq!(cascade.data()[stage2 + 2], 0.0);
    }
}
