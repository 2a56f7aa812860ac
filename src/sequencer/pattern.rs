/// Step patterns and the copy-on-write store the transport reads from
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use crate::audio::{DropLength, Note, Trigger};

/// Steps per bar (sixteenth notes in 4/4)
pub const STEPS: usize = 16;

/// Boolean step grid, `width` steps by `height` rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    cells: Vec<Vec<bool>>,
    width: usize,
    height: usize,
}

impl Grid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            cells: vec![vec![false; width]; height],
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Out-of-range cells read as inactive
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.cells
            .get(y)
            .and_then(|row| row.get(x))
            .copied()
            .unwrap_or(false)
    }

    /// Out-of-range cells are ignored
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        if let Some(row) = self.cells.get_mut(y) {
            if let Some(cell) = row.get_mut(x) {
                *cell = value;
            }
        }
    }

    pub fn toggle(&mut self, x: usize, y: usize) {
        let current = self.get(x, y);
        self.set(x, y, !current);
    }

    pub fn active_count(&self) -> usize {
        self.cells.iter().flatten().filter(|&&cell| cell).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Drum {
    Kick,
    Snare,
    HiHat,
}

impl Drum {
    pub const ALL: [Drum; 3] = [Drum::Kick, Drum::Snare, Drum::HiHat];

    pub fn trigger(self) -> Trigger {
        match self {
            Drum::Kick => Trigger::Kick,
            Drum::Snare => Trigger::Snare,
            Drum::HiHat => Trigger::HiHat,
        }
    }
}

/// Instrument families, each owning one grid of the pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    Drums,
    Bass,
    Synth,
    Strings,
    Drop,
}

impl Instrument {
    pub const ALL: [Instrument; 5] = [
        Instrument::Drums,
        Instrument::Bass,
        Instrument::Synth,
        Instrument::Strings,
        Instrument::Drop,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Instrument::Drums => "Drums",
            Instrument::Bass => "Bass",
            Instrument::Synth => "Synth",
            Instrument::Strings => "Strings",
            Instrument::Drop => "Drop",
        }
    }

    pub fn row_count(self) -> usize {
        match self {
            Instrument::Drums => Drum::ALL.len(),
            Instrument::Bass | Instrument::Synth | Instrument::Strings => Note::ALL.len(),
            Instrument::Drop => DropLength::ALL.len(),
        }
    }

    /// Rows of this family, top to bottom
    pub fn rows(self) -> Vec<Row> {
        match self {
            Instrument::Drums => Drum::ALL.into_iter().map(Row::Drum).collect(),
            Instrument::Bass => Note::ALL.into_iter().map(Row::Bass).collect(),
            Instrument::Synth => Note::ALL.into_iter().map(Row::Synth).collect(),
            Instrument::Strings => Note::ALL.into_iter().map(Row::Strings).collect(),
            Instrument::Drop => DropLength::ALL.into_iter().map(Row::Drop).collect(),
        }
    }

    /// Sound played when the family is selected
    pub fn preview(self) -> Trigger {
        match self {
            Instrument::Drums => Trigger::Kick,
            Instrument::Bass => Trigger::Bass(Note::D4),
            Instrument::Synth => Trigger::Synth(Note::E4),
            Instrument::Strings => Trigger::Strings(Note::G4),
            Instrument::Drop => Trigger::Drop { seconds: 0.5 },
        }
    }
}

/// One addressable sequence of the pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Row {
    Drum(Drum),
    Bass(Note),
    Synth(Note),
    Strings(Note),
    Drop(DropLength),
}

impl Row {
    pub fn instrument(self) -> Instrument {
        match self {
            Row::Drum(_) => Instrument::Drums,
            Row::Bass(_) => Instrument::Bass,
            Row::Synth(_) => Instrument::Synth,
            Row::Strings(_) => Instrument::Strings,
            Row::Drop(_) => Instrument::Drop,
        }
    }

    /// Position within the family grid
    pub fn index(self) -> usize {
        match self {
            Row::Drum(drum) => drum as usize,
            Row::Bass(note) | Row::Synth(note) | Row::Strings(note) => note.index(),
            Row::Drop(length) => length.index(),
        }
    }

    pub fn trigger(self) -> Trigger {
        match self {
            Row::Drum(drum) => drum.trigger(),
            Row::Bass(note) => Trigger::Bass(note),
            Row::Synth(note) => Trigger::Synth(note),
            Row::Strings(note) => Trigger::Strings(note),
            Row::Drop(length) => length.into(),
        }
    }

    pub fn label(self) -> String {
        match self {
            Row::Drum(Drum::Kick) => "Kick".to_string(),
            Row::Drum(Drum::Snare) => "Snare".to_string(),
            Row::Drum(Drum::HiHat) => "Hi-Hat".to_string(),
            Row::Bass(note) | Row::Synth(note) | Row::Strings(note) => {
                format!("Note {}", note.index() + 1)
            }
            Row::Drop(length) => format!("{:.1}s", length.seconds()),
        }
    }
}

/// All five family grids. Families live behind `Arc`s so an edit copies only
/// the grid it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    drums: Arc<Grid>,
    bass: Arc<Grid>,
    synth: Arc<Grid>,
    strings: Arc<Grid>,
    drop: Arc<Grid>,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::empty()
    }
}

impl Pattern {
    pub fn empty() -> Self {
        let grid = |instrument: Instrument| Arc::new(Grid::new(STEPS, instrument.row_count()));
        Self {
            drums: grid(Instrument::Drums),
            bass: grid(Instrument::Bass),
            synth: grid(Instrument::Synth),
            strings: grid(Instrument::Strings),
            drop: grid(Instrument::Drop),
        }
    }

    pub fn grid(&self, instrument: Instrument) -> &Arc<Grid> {
        match instrument {
            Instrument::Drums => &self.drums,
            Instrument::Bass => &self.bass,
            Instrument::Synth => &self.synth,
            Instrument::Strings => &self.strings,
            Instrument::Drop => &self.drop,
        }
    }

    fn grid_mut(&mut self, instrument: Instrument) -> &mut Grid {
        let grid = match instrument {
            Instrument::Drums => &mut self.drums,
            Instrument::Bass => &mut self.bass,
            Instrument::Synth => &mut self.synth,
            Instrument::Strings => &mut self.strings,
            Instrument::Drop => &mut self.drop,
        };
        Arc::make_mut(grid)
    }

    pub fn is_active(&self, row: Row, step: usize) -> bool {
        self.grid(row.instrument()).get(step, row.index())
    }

    pub fn set(&mut self, row: Row, step: usize, value: bool) {
        self.grid_mut(row.instrument()).set(step, row.index(), value);
    }

    pub fn toggle(&mut self, row: Row, step: usize) {
        self.grid_mut(row.instrument()).toggle(step, row.index());
    }

    /// Builder-style: activate `steps` of `row`
    pub fn with(mut self, row: Row, steps: &[usize]) -> Self {
        for &step in steps {
            self.set(row, step, true);
        }
        self
    }

    /// Rows active at `step`, in playback order: drums, bass, synth,
    /// strings, drop
    pub fn active_rows(&self, step: usize) -> Vec<Row> {
        Instrument::ALL
            .into_iter()
            .flat_map(Instrument::rows)
            .filter(|&row| self.is_active(row, step))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        Instrument::ALL
            .iter()
            .map(|&instrument| self.grid(instrument).active_count())
            .sum()
    }

    pub fn cell_count(&self) -> usize {
        Instrument::ALL
            .iter()
            .map(|&instrument| {
                let grid = self.grid(instrument);
                grid.width() * grid.height()
            })
            .sum()
    }
}

/// Current pattern, published as immutable snapshots. Readers never block
/// and a snapshot never changes under them.
pub struct PatternStore {
    current: ArcSwap<Pattern>,
}

impl PatternStore {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            current: ArcSwap::from_pointee(pattern),
        }
    }

    pub fn load(&self) -> Arc<Pattern> {
        self.current.load_full()
    }

    /// Flip one cell and publish the result. Steps past the end of the bar
    /// leave the pattern untouched.
    pub fn toggle(&self, row: Row, step: usize) -> Arc<Pattern> {
        if step >= STEPS {
            warn!(?row, step, "toggle outside the bar ignored");
            return self.load();
        }

        let mut published = None;
        self.current.rcu(|current| {
            let mut next = Pattern::clone(current);
            next.toggle(row, step);
            let next = Arc::new(next);
            published = Some(Arc::clone(&next));
            next
        });

        let published = published.unwrap_or_else(|| self.load());
        debug!(?row, step, active = published.is_active(row, step), "step toggled");
        published
    }

    pub fn replace_all(&self, pattern: Pattern) {
        self.current.store(Arc::new(pattern));
        debug!("pattern replaced");
    }

    pub fn clear(&self) {
        self.replace_all(Pattern::empty());
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(Pattern::empty())
    }
}
