/// Built-in demo patterns
use super::pattern::{Drum, Pattern, Row};
use crate::audio::{DropLength, Note};

pub struct Demo {
    pub name: &'static str,
    build: fn() -> Pattern,
}

impl Demo {
    pub fn pattern(&self) -> Pattern {
        (self.build)()
    }
}

pub static DEMOS: [Demo; 4] = [
    Demo {
        name: "Classic House",
        build: classic_house,
    },
    Demo {
        name: "Breakbeat Jungle",
        build: breakbeat_jungle,
    },
    Demo {
        name: "Ambient Chill",
        build: ambient_chill,
    },
    Demo {
        name: "Techno Banger",
        build: techno_banger,
    },
];

const EVEN_STEPS: [usize; 8] = [0, 2, 4, 6, 8, 10, 12, 14];
const ODD_STEPS: [usize; 8] = [1, 3, 5, 7, 9, 11, 13, 15];
const ALL_STEPS: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

fn classic_house() -> Pattern {
    Pattern::empty()
        .with(Row::Drum(Drum::Kick), &[0, 4, 8, 12])
        .with(Row::Drum(Drum::Snare), &[4, 12])
        .with(Row::Drum(Drum::HiHat), &EVEN_STEPS)
        .with(Row::Bass(Note::A3), &[0, 8])
        .with(Row::Bass(Note::C4), &[4])
        .with(Row::Bass(Note::D4), &[12])
        .with(Row::Synth(Note::G4), &[2])
        .with(Row::Synth(Note::E4), &[6])
        .with(Row::Synth(Note::D4), &[10])
        .with(Row::Synth(Note::C4), &[14])
        .with(Row::Drop(DropLength::Short), &[0])
        .with(Row::Drop(DropLength::Medium), &[4])
        .with(Row::Drop(DropLength::Long), &[8])
        .with(Row::Drop(DropLength::Extended), &[12])
        .with(Row::Strings(Note::A4), &[0])
        .with(Row::Strings(Note::E4), &[4])
        .with(Row::Strings(Note::G4), &[8])
        .with(Row::Strings(Note::D4), &[12])
}

fn breakbeat_jungle() -> Pattern {
    Pattern::empty()
        .with(Row::Drum(Drum::Kick), &[0, 3, 6, 10, 13])
        .with(Row::Drum(Drum::Snare), &[4, 7, 12])
        .with(Row::Drum(Drum::HiHat), &ALL_STEPS)
        .with(Row::Bass(Note::A3), &[0, 4, 8, 12])
        .with(Row::Bass(Note::C4), &[2, 10])
        .with(Row::Bass(Note::D4), &[6, 14])
        .with(Row::Synth(Note::A4), &[4, 12])
        .with(Row::Synth(Note::G4), &[8])
        .with(Row::Drop(DropLength::Medium), &[6])
        .with(Row::Drop(DropLength::Long), &[14])
        .with(Row::Strings(Note::C4), &[0])
        .with(Row::Strings(Note::D4), &[8])
}

fn ambient_chill() -> Pattern {
    Pattern::empty()
        .with(Row::Drum(Drum::Kick), &[0, 8])
        .with(Row::Drum(Drum::Snare), &[6, 14])
        .with(Row::Drum(Drum::HiHat), &[2, 6, 10, 14])
        .with(Row::Bass(Note::C4), &[0])
        .with(Row::Bass(Note::D4), &[8])
        .with(Row::Synth(Note::A4), &[0])
        .with(Row::Synth(Note::G4), &[4, 12])
        .with(Row::Synth(Note::E4), &[8])
        .with(Row::Drop(DropLength::Short), &[4])
        .with(Row::Drop(DropLength::Medium), &[12])
        .with(Row::Strings(Note::G4), &[0, 12])
        .with(Row::Strings(Note::A4), &[4])
        .with(Row::Strings(Note::E4), &[8])
}

fn techno_banger() -> Pattern {
    Pattern::empty()
        .with(Row::Drum(Drum::Kick), &[0, 4, 8, 12])
        .with(Row::Drum(Drum::Snare), &[2, 6, 10, 14])
        .with(Row::Drum(Drum::HiHat), &ODD_STEPS)
        .with(Row::Bass(Note::A3), &[0, 6, 12])
        .with(Row::Bass(Note::C4), &[3, 15])
        .with(Row::Bass(Note::D4), &[9])
        .with(Row::Synth(Note::D4), &[0, 8])
        .with(Row::Synth(Note::E4), &[2, 6, 10])
        .with(Row::Synth(Note::G4), &[4, 12])
        .with(Row::Synth(Note::A4), &[14])
        .with(Row::Drop(DropLength::Long), &[0])
        .with(Row::Drop(DropLength::Extended), &[8])
}

/// Cycles through `DEMOS`
#[derive(Debug, Clone)]
pub struct DemoLibrary {
    index: usize,
}

impl DemoLibrary {
    /// Out-of-range indices wrap
    pub fn new(index: usize) -> Self {
        Self {
            index: index % DEMOS.len(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> &'static Demo {
        &DEMOS[self.index]
    }

    /// Advance to the next preset, wrapping after the last
    pub fn next(&mut self) -> &'static Demo {
        self.index = (self.index + 1) % DEMOS.len();
        self.current()
    }
}

impl Default for DemoLibrary {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::pattern::Instrument;

    #[test]
    fn test_demo_names() {
        let names: Vec<&str> = DEMOS.iter().map(|demo| demo.name).collect();
        assert_eq!(
            names,
            vec!["Classic House", "Breakbeat Jungle", "Ambient Chill", "Techno Banger"]
        );
    }

    #[test]
    fn test_next_wraps_after_last() {
        let mut library = DemoLibrary::new(0);
        let first = library.current().pattern();
        for _ in 0..3 {
            library.next();
        }
        assert_eq!(library.current().name, "Techno Banger");
        assert_eq!(library.next().pattern(), first);
        assert_eq!(library.index(), 0);
    }

    #[test]
    fn test_techno_banger_has_no_strings() {
        let pattern = DEMOS[3].pattern();
        assert_eq!(pattern.grid(Instrument::Strings).active_count(), 0);
        assert!(pattern.is_active(Row::Drum(Drum::HiHat), 15));
        assert!(!pattern.is_active(Row::Drum(Drum::HiHat), 0));
    }

    #[test]
    fn test_every_demo_has_a_beat() {
        for demo in &DEMOS {
            let pattern = demo.pattern();
            assert!(pattern.is_active(Row::Drum(Drum::Kick), 0), "{}", demo.name);
        }
    }
}
