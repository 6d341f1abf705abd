//! Chunking plans and drivers for streaming parity tests.
//!
//! Fragments handed to a stream are `&str`, so every boundary a plan
//! produces is snapped down to a UTF-8 character boundary.

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::stream::ParserStream;
use crate::unit::StreamItem;
use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChunkPlan {
    Fixed { size: usize },
    Sizes { sizes: Vec<usize> },
    Boundaries { indices: Vec<usize> },
}

impl fmt::Display for ChunkPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkPlan::Fixed { size } => write!(f, "fixed size={size}"),
            ChunkPlan::Sizes { sizes } => {
                write!(f, "sizes count={} sizes={sizes:?}", sizes.len())
            }
            ChunkPlan::Boundaries { indices } => {
                write!(f, "boundaries count={} indices={indices:?}", indices.len())
            }
        }
    }
}

impl ChunkPlan {
    pub fn fixed(size: usize) -> Self {
        Self::Fixed { size }
    }

    pub fn sizes(sizes: impl Into<Vec<usize>>) -> Self {
        Self::Sizes { sizes: sizes.into() }
    }

    pub fn boundaries(indices: impl Into<Vec<usize>>) -> Self {
        Self::Boundaries {
            indices: indices.into(),
        }
    }

    /// Split points in `(0, input.len())`, sorted, deduplicated and aligned.
    pub fn split_points(&self, input: &str) -> Vec<usize> {
        let len = input.len();
        let mut points = Vec::new();
        match self {
            ChunkPlan::Fixed { size } => {
                assert!(*size > 0, "chunk size must be > 0");
                let mut offset = *size;
                while offset < len {
                    points.push(offset);
                    offset += size;
                }
            }
            ChunkPlan::Sizes { sizes } => {
                let mut offset = 0usize;
                for size in sizes {
                    assert!(*size > 0, "chunk size must be > 0");
                    offset += size;
                    if offset >= len {
                        break;
                    }
                    points.push(offset);
                }
            }
            ChunkPlan::Boundaries { indices } => points.extend(indices.iter().copied()),
        }
        let mut aligned: Vec<usize> = points
            .into_iter()
            .filter(|&idx| idx > 0 && idx < len)
            .map(|idx| floor_char_boundary(input, idx))
            .filter(|&idx| idx > 0)
            .collect();
        aligned.sort_unstable();
        aligned.dedup();
        aligned
    }

    pub fn chunks<'a>(&self, input: &'a str) -> Vec<&'a str> {
        let mut out = Vec::new();
        let mut last = 0usize;
        for idx in self.split_points(input) {
            out.push(&input[last..idx]);
            last = idx;
        }
        if last < input.len() {
            out.push(&input[last..]);
        }
        out
    }

    pub fn for_each_chunk(&self, input: &str, mut f: impl FnMut(&str)) {
        for chunk in self.chunks(input) {
            f(chunk);
        }
    }
}

fn floor_char_boundary(input: &str, mut idx: usize) -> usize {
    while !input.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Feed `input` through a fresh stream following `plan`.
pub fn run_chunked(input: &str, plan: &ChunkPlan, config: StreamConfig) -> Result<Vec<StreamItem>, StreamError> {
    let mut stream = ParserStream::new(config, Vec::new())?;
    for chunk in plan.chunks(input) {
        stream.write(chunk)?;
    }
    stream.finish()?;
    Ok(stream.into_sink())
}

pub fn deterministic_chunk_plans(input: &str) -> Vec<ChunkPlan> {
    let mut plans = vec![ChunkPlan::fixed(input.len().max(1))];
    for size in [1usize, 2, 3, 4, 7, 16, 64] {
        plans.push(ChunkPlan::fixed(size));
    }
    plans.push(ChunkPlan::sizes(vec![1, 1, 2, 1, 4, 8, 16, 3, 7]));
    let semantic = semantic_boundaries(input, 256);
    if !semantic.is_empty() {
        plans.push(ChunkPlan::boundaries(semantic));
    }
    plans
}

pub struct FuzzChunkPlan {
    pub plan: ChunkPlan,
    pub summary: String,
}

pub fn random_chunk_plan(input: &str, seed: u64) -> FuzzChunkPlan {
    let mut rng = LcgRng::new(seed);
    let len = input.len();
    if len <= 1 {
        return FuzzChunkPlan {
            plan: ChunkPlan::fixed(1),
            summary: format!("fixed size=1 len={len} seed=0x{seed:016x}"),
        };
    }
    if rng.gen_ratio(1, 2) {
        let count = rng.gen_range_usize(1, len.min(32) + 1);
        let sizes = random_sizes(&mut rng, len, count);
        FuzzChunkPlan {
            summary: format!(
                "sizes count={} len={len} seed=0x{seed:016x} sizes={sizes:?}",
                sizes.len()
            ),
            plan: ChunkPlan::sizes(sizes),
        }
    } else {
        let base = semantic_boundaries(input, 256);
        let indices = if base.is_empty() {
            let count = rng.gen_range_usize(1, len.min(16) + 1);
            (0..count).map(|_| rng.gen_range_usize(1, len)).collect()
        } else {
            random_semantic_boundaries(&mut rng, &base, len)
        };
        FuzzChunkPlan {
            summary: format!(
                "boundaries count={} len={len} seed=0x{seed:016x} indices={indices:?}",
                indices.len()
            ),
            plan: ChunkPlan::boundaries(indices),
        }
    }
}

/// Seeds per fuzz case, overridable with `HTML_STREAM_FUZZ_SEEDS`.
pub fn fuzz_seed_count(default: usize) -> usize {
    std::env::var("HTML_STREAM_FUZZ_SEEDS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(default)
}

/// Greedily drop split points while `fails` keeps failing.
pub fn shrink_chunk_plan(input: &str, plan: &ChunkPlan, mut fails: impl FnMut(&ChunkPlan) -> bool) -> ChunkPlan {
    let mut points = plan.split_points(input);
    let mut idx = 0usize;
    while idx < points.len() {
        let mut candidate = points.clone();
        candidate.remove(idx);
        if fails(&ChunkPlan::boundaries(candidate.clone())) {
            points = candidate;
        } else {
            idx += 1;
        }
    }
    ChunkPlan::boundaries(points)
}

fn semantic_boundaries(input: &str, max_points: usize) -> Vec<usize> {
    let bytes = input.as_bytes();
    let mut out = Vec::new();
    for (idx, &byte) in bytes.iter().enumerate() {
        if matches!(byte, b'<' | b'>' | b'&' | b';' | b'"' | b'-' | b'/' | b'=' | b' ') {
            out.push(idx);
            if idx + 1 < bytes.len() {
                out.push(idx + 1);
            }
        }
    }
    out.retain(|&idx| idx > 0 && input.is_char_boundary(idx));
    out.sort_unstable();
    out.dedup();
    out.truncate(max_points);
    out
}

fn random_sizes(rng: &mut LcgRng, len: usize, count: usize) -> Vec<usize> {
    let mut remaining = len;
    let mut sizes = Vec::with_capacity(count);
    for i in 0..count {
        if remaining == 0 {
            break;
        }
        let max_size = remaining.saturating_sub(count.saturating_sub(i + 1)).max(1);
        let biased_max = if rng.gen_ratio(7, 10) {
            max_size.clamp(1, 8)
        } else {
            max_size
        };
        let size = rng.gen_range_usize(1, biased_max + 1);
        sizes.push(size);
        remaining = remaining.saturating_sub(size);
    }
    sizes
}

fn random_semantic_boundaries(rng: &mut LcgRng, base: &[usize], len: usize) -> Vec<usize> {
    let max_points = base.len().min(32);
    let pick_count = rng.gen_range_usize(1, max_points + 1);
    let mut out = Vec::with_capacity(pick_count);
    for _ in 0..pick_count {
        let idx = base[rng.gen_index(base.len())];
        let jittered = if rng.gen_ratio(1, 2) {
            idx
        } else if rng.gen_ratio(1, 2) {
            idx.saturating_sub(1).max(1)
        } else {
            (idx + 1).min(len.saturating_sub(1))
        };
        if jittered > 0 && jittered < len {
            out.push(jittered);
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

struct LcgRng {
    state: u64,
}

impl LcgRng {
    fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    fn gen_range_usize(&mut self, start: usize, end: usize) -> usize {
        assert!(start < end, "invalid range: {start}..{end}");
        let span = (end - start) as u64;
        (self.next_u64() % span) as usize + start
    }

    fn gen_index(&mut self, len: usize) -> usize {
        self.gen_range_usize(0, len)
    }

    fn gen_ratio(&mut self, numerator: u32, denominator: u32) -> bool {
        let roll = (self.next_u64() % denominator as u64) as u32;
        roll < numerator
    }
}
