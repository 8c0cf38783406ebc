//! Box tree construction and path lookup.

use super::FourCc;
use crate::bitstream::ByteReader;
use crate::{Error, Result};

/// Tags whose payload is always a sequence of boxes. Malformed children of
/// these are reported; for any other tag the payload is only parsed as boxes
/// when it looks like one, and a failure leaves the box as a leaf.
const KNOWN_CONTAINERS: &[&[u8; 4]] = &[
    b"moov", b"trak", b"mdia", b"minf", b"stbl", b"mvex", b"moof", b"traf", b"edts", b"dinf",
    b"udta",
];

/// One parsed box with its absolute extent in the source buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxNode {
    pub tag: FourCc,
    /// Offset of the size field.
    pub start: usize,
    /// 8, or 16 for a 64-bit size.
    pub header_size: usize,
    /// Declared end offset; may lie past the end of a truncated buffer.
    pub end: usize,
    pub children: Vec<BoxNode>,
}

impl BoxNode {
    /// Offset of the first payload byte.
    pub fn payload_start(&self) -> usize {
        self.start + self.header_size
    }

    /// Declared size including the header.
    pub fn size(&self) -> usize {
        self.end - self.start
    }

    /// All direct children with the given tag, in encounter order.
    pub fn children_named<'s>(&'s self, tag: &'s str) -> impl Iterator<Item = &'s BoxNode> + 's {
        self.children.iter().filter(move |c| c.tag == tag)
    }
}

/// Parsed box hierarchy over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct BoxTree<'a> {
    data: &'a [u8],
    boxes: Vec<BoxNode>,
}

impl<'a> BoxTree<'a> {
    /// Parse all top-level boxes of `data`.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let boxes = parse_range(data, 0, data.len())?;
        Ok(Self { data, boxes })
    }

    /// Top-level boxes in encounter order.
    pub fn boxes(&self) -> &[BoxNode] {
        &self.boxes
    }

    /// Resolve a dotted path such as `moof.traf.trun`.
    ///
    /// At each level the last matching sibling is tried first; when it has no
    /// match for the rest of the path, earlier siblings are tried.
    pub fn find(&self, path: &str) -> Option<&BoxNode> {
        let parts: Vec<&str> = path.split('.').collect();
        find_in(&self.boxes, &parts)
    }

    /// Every node matching a dotted path, in encounter order.
    pub fn find_all(&self, path: &str) -> Vec<&BoxNode> {
        let parts: Vec<&str> = path.split('.').collect();
        let mut out = Vec::new();
        collect_in(&self.boxes, &parts, &mut out);
        out
    }

    /// Payload bytes of a node, clamped to the available buffer.
    pub fn payload(&self, node: &BoxNode) -> &'a [u8] {
        let start = node.payload_start().min(self.data.len());
        let end = node.end.min(self.data.len());
        &self.data[start..end]
    }

    /// Payload of the node at `path`, if present.
    pub fn payload_at(&self, path: &str) -> Option<&'a [u8]> {
        self.find(path).map(|node| self.payload(node))
    }

    /// Whether the buffer ends before the declared end of a top-level box.
    pub fn is_truncated(&self) -> bool {
        self.boxes
            .last()
            .map(|b| b.end > self.data.len())
            .unwrap_or(false)
    }
}

fn find_in<'n>(nodes: &'n [BoxNode], parts: &[&str]) -> Option<&'n BoxNode> {
    let (head, rest) = parts.split_first()?;
    for node in nodes.iter().rev().filter(|n| n.tag == *head) {
        if rest.is_empty() {
            return Some(node);
        }
        if let Some(found) = find_in(&node.children, rest) {
            return Some(found);
        }
    }
    None
}

fn collect_in<'n>(nodes: &'n [BoxNode], parts: &[&str], out: &mut Vec<&'n BoxNode>) {
    let Some((head, rest)) = parts.split_first() else {
        return;
    };
    for node in nodes.iter().filter(|n| n.tag == *head) {
        if rest.is_empty() {
            out.push(node);
        } else {
            collect_in(&node.children, rest, out);
        }
    }
}

/// Whether the bytes at `start` look like the header of a box that fits in
/// `[start, end)`.
fn looks_like_box(data: &[u8], start: usize, end: usize) -> bool {
    if end < start + 8 || data.len() < start + 8 {
        return false;
    }
    let tag = FourCc::from_bytes([
        data[start + 4],
        data[start + 5],
        data[start + 6],
        data[start + 7],
    ]);
    if !tag.is_alphanumeric() {
        return false;
    }
    let size = u32::from_be_bytes([data[start], data[start + 1], data[start + 2], data[start + 3]]);
    size as usize <= end - start
}

fn parse_range(data: &[u8], start: usize, end: usize) -> Result<Vec<BoxNode>> {
    let mut nodes = Vec::new();
    let mut pos = start;
    let limit = end.min(data.len());

    while pos < limit {
        if pos + 8 > end {
            return Err(Error::truncated("box header", pos, 8, end - pos));
        }
        if pos + 8 > data.len() {
            // Buffer is a prefix of the fragment; the rest was not fetched.
            break;
        }

        let mut reader = ByteReader::with_base(&data[pos..], pos);
        let size32 = reader.read_u32()?;
        let tag_bytes = reader.slice(4)?;
        let tag = FourCc::from_bytes([tag_bytes[0], tag_bytes[1], tag_bytes[2], tag_bytes[3]]);

        let (size, header_size) = match size32 {
            1 => {
                if pos + 16 > end {
                    return Err(Error::truncated("large box size", pos + 8, 8, end - pos - 8));
                }
                if pos + 16 > data.len() {
                    break;
                }
                (reader.read_u64()?, 16usize)
            }
            0 => ((end - pos) as u64, 8usize),
            n => (n as u64, 8usize),
        };

        if size < header_size as u64 {
            return Err(Error::invalid_box(
                pos,
                format!("'{}' declares size {} below its {}-byte header", tag, size, header_size),
            ));
        }

        let box_end = usize::try_from(size)
            .ok()
            .and_then(|s| pos.checked_add(s))
            .ok_or_else(|| Error::invalid_box(pos, format!("'{}' size {} overflows", tag, size)))?;

        let payload_start = pos + header_size;
        let children = if looks_like_box(data, payload_start, box_end) {
            let child_end = box_end.min(end);
            if KNOWN_CONTAINERS.iter().any(|t| **t == tag.0) {
                parse_range(data, payload_start, child_end)?
            } else {
                parse_range(data, payload_start, child_end).unwrap_or_default()
            }
        } else {
            Vec::new()
        };

        nodes.push(BoxNode {
            tag,
            start: pos,
            header_size,
            end: box_end,
            children,
        });
        pos = box_end;
    }

    Ok(nodes)
}
