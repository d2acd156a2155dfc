//! Scripted note sequences for offline rendering
//!
//! A script is a whitespace-separated list of steps, `NOTES:MS`, where
//! `NOTES` is one note (`C4`), a chord (`C4+E4+G4`) or `-` for a rest, held
//! for `MS` milliseconds:
//!
//! ```text
//! C4:400 E4:400 G4:400 -:200 C4+E4+G4:1200
//! ```

use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

use super::{SynthEngine, VoiceObserver};
use crate::audio::{AudioDevice, RenderDevice};
use crate::keymap::{self, NoteBinding};

/// Notes pressed together and how long they are held
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    /// Empty for a rest
    pub notes: Vec<&'static NoteBinding>,
    /// Seconds
    pub duration: f64,
}

/// A parsed note script
#[derive(Debug, Clone, PartialEq)]
pub struct NoteScript {
    steps: Vec<ScriptStep>,
}

impl NoteScript {
    pub fn parse(text: &str) -> Result<Self> {
        let steps = text
            .split_whitespace()
            .map(parse_step)
            .collect::<Result<Vec<_>>>()?;

        if steps.is_empty() {
            bail!("Script contains no steps");
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    /// Seconds from the first note-on to the last note-off
    pub fn duration(&self) -> f64 {
        self.steps.iter().map(|s| s.duration).sum()
    }

    /// Play the script through `engine`, handing every rendered block to
    /// `sink`, then render until the last release has finished.
    pub fn render<O: VoiceObserver>(
        &self,
        engine: &mut SynthEngine<RenderDevice, O>,
        block_size: usize,
        mut sink: impl FnMut(&[f32]) -> Result<()>,
    ) -> Result<()> {
        let mut buffer = vec![0.0f32; block_size.max(1)];
        engine
            .device_mut()
            .resume()
            .context("failed to start offline rendering")?;

        for step in &self.steps {
            for binding in &step.notes {
                engine.note_on(binding.note, binding.frequency)?;
            }
            render_for(engine, step.duration, &mut buffer, &mut sink)?;
            for binding in &step.notes {
                engine.note_off(binding.note);
            }
        }

        let release = engine.envelope().release;
        render_for(engine, release, &mut buffer, &mut sink)?;
        while !engine.active_notes().is_empty() || engine.release_tails() > 0 {
            render_for(engine, 1.0 / engine.device().sample_rate() as f64, &mut buffer, &mut sink)?;
        }

        Ok(())
    }
}

impl FromStr for NoteScript {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_step(step: &str) -> Result<ScriptStep> {
    let (notes, millis) = step
        .split_once(':')
        .ok_or_else(|| anyhow!("Step '{}' is missing a duration (expected NOTES:MS)", step))?;

    let millis: f64 = millis
        .parse()
        .with_context(|| format!("Step '{}' has an invalid duration", step))?;
    if !(millis.is_finite() && millis > 0.0) {
        bail!("Step '{}' must last longer than 0 ms", step);
    }

    let notes = if notes == "-" {
        Vec::new()
    } else {
        notes
            .split('+')
            .map(|note| {
                keymap::binding(note)
                    .ok_or_else(|| anyhow!("Unknown note '{}' in step '{}'", note, step))
            })
            .collect::<Result<Vec<_>>>()?
    };

    Ok(ScriptStep {
        notes,
        duration: millis / 1000.0,
    })
}

fn render_for<O: VoiceObserver>(
    engine: &mut SynthEngine<RenderDevice, O>,
    seconds: f64,
    buffer: &mut [f32],
    sink: &mut impl FnMut(&[f32]) -> Result<()>,
) -> Result<()> {
    let rate = engine.device().sample_rate() as f64;
    let mut remaining = (seconds * rate).round() as usize;

    while remaining > 0 {
        let len = remaining.min(buffer.len());
        engine.device_mut().render(&mut buffer[..len]);
        sink(&buffer[..len])?;
        engine.poll();
        remaining -= len;
    }

    Ok(())
}
