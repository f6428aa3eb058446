//! Fixtures shared by the benchmarks.

/// Size class of a fixture, used to group benchmark reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FixtureSize {
    Small,
    Normal,
    Large,
}

/// Raw wire bytes fed to a benchmark.
#[derive(Debug, Copy, Clone)]
pub struct Fixture {
    name: &'static str,
    size: FixtureSize,
    content: &'static str,
}

impl Fixture {
    pub const fn new(name: &'static str, size: FixtureSize, content: &'static str) -> Self {
        Self { name, size, content }
    }

    pub const fn small(name: &'static str, content: &'static str) -> Self {
        Self::new(name, FixtureSize::Small, content)
    }

    pub const fn normal(name: &'static str, content: &'static str) -> Self {
        Self::new(name, FixtureSize::Normal, content)
    }

    pub const fn large(name: &'static str, content: &'static str) -> Self {
        Self::new(name, FixtureSize::Large, content)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn size(&self) -> FixtureSize {
        self.size
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    /// Length in bytes, for throughput reports.
    pub fn len(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
