use std::fmt;

/// Zero-padded numeric token identifying one possible remote resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateId {
    value: u32,
    width: usize,
}

impl CandidateId {
    pub fn new(value: u32, width: usize) -> Self {
        Self { value, width }
    }

    /// Parse a token such as `"0042"` or `"42"`; the width is the larger of
    /// the token length and `min_width`.
    pub fn parse(token: &str, min_width: usize) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value = token.parse::<u32>().ok()?;
        Some(Self::new(value, token.len().max(min_width)))
    }

    pub fn value(&self) -> u32 {
        self.value
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.value, width = self.width)
    }
}

/// Contiguous inclusive range `[start, end]` of candidate ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateRange {
    pub start: u32,
    pub end: u32,
    pub width: usize,
}

impl CandidateRange {
    pub fn new(start: u32, end: u32, width: usize) -> Self {
        Self { start, end, width }
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = CandidateId> + '_ {
        let width = self.width;
        (self.start..=self.end)
            .take(self.len())
            .map(move |v| CandidateId::new(v, width))
    }

    pub fn ids(&self) -> Vec<CandidateId> {
        self.iter().collect()
    }
}
