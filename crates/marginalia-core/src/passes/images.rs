//! Pass 12: apply image-invertibility decisions.
//!
//! The mean-color computations ran in the I/O phase (memoized through
//! [`crate::invert::InvertCache`]); this pass only reads the decision
//! map. Images and links pointing at raster files below the lightness
//! threshold gain `invertible-auto` and nothing else changes.

use std::collections::HashMap;

use crate::ast::{Block, Inline, walk_inlines_mut};
use crate::metadata::strip_fragment;

pub const INVERTIBLE_CLASS: &str = "invertible-auto";

pub fn run(blocks: &mut [Block], decisions: &HashMap<String, bool>) {
    walk_inlines_mut(blocks, &mut |inline| {
        let (attr, target) = match inline {
            Inline::Image(attr, _, (src, _)) => (attr, src.clone()),
            Inline::Link(attr, _, (target, _)) if is_raster_target(target) => {
                (attr, target.clone())
            }
            _ => return,
        };
        if decisions.get(strip_fragment(&target)) == Some(&true) {
            attr.add_class(INVERTIBLE_CLASS);
        }
    });
}

/// Links to raster images get the class too so their popups invert.
pub(crate) fn is_raster_target(target: &str) -> bool {
    let base = strip_fragment(target).to_lowercase();
    base.ends_with(".png") || base.ends_with(".jpg") || base.ends_with(".jpeg")
}

/// All image sources and raster link targets in a document: the I/O
/// phase classifies exactly these.
pub fn collect_image_targets(blocks: &[Block]) -> Vec<String> {
    let mut targets = Vec::new();
    crate::ast::walk_inlines(blocks, &mut |inline| {
        match inline {
            Inline::Image(_, _, (src, _)) => targets.push(strip_fragment(src).to_string()),
            Inline::Link(_, _, (target, _)) if is_raster_target(target) => {
                targets.push(strip_fragment(target).to_string())
            }
            _ => {}
        }
    });
    targets.sort();
    targets.dedup();
    targets
}
