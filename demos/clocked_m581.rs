//! Clocked M581 Example
//!
//! A PwmClock sixteenth-note output drives an M581 in pendulum mode. Each
//! time the sequencer changes step we print the step, its CV and gate.
//!
//! Run with: RUST_LOG=debug cargo run --example clocked_m581

use xorseq::modules::m581;
use xorseq::prelude::*;

fn main() -> Result<(), SequencerError> {
    env_logger::init();

    // Control-rate sample rate keeps the printout short
    let sample_rate = 1000.0;
    let config = EngineConfig::new(sample_rate).with_seed(581);
    let registry = ModuleRegistry::new();

    let mut rack = Rack::new(sample_rate);
    let clock = rack.add_boxed("clock", registry.create("pwm_clock", &config)?);
    let seq = rack.add_boxed("seq", registry.create("m581", &config)?);

    rack.connect(clock.out("1_16")?, seq.in_("clock")?)?;
    rack.compile()?;

    // A rising line of notes, pendulum run mode, stage 4 slides
    for k in 0..8 {
        rack.set_param(seq.id(), m581::STEP_NOTE + k, 0.1 + 0.1 * k as f64);
    }
    rack.set_param(seq.id(), m581::RUN_MODE, 2.0);
    rack.set_param(seq.id(), m581::STEP_ENABLE + 3, 2.0);

    let cv = seq.out("cv")?;
    let gate = seq.out("gate")?;

    println!("step     cv    gate");
    let mut last_step = None;
    // Two seconds at 120 bpm: 16 sixteenth notes
    for _ in 0..2000 {
        rack.tick();
        let step = (0..8).find(|&k| rack.light(seq.id(), m581::LIGHT_STEP + k) == Some(LIGHT_ON));
        if step != last_step {
            last_step = step;
            println!(
                "{:>4}  {:>5.2}  {:>5.1}",
                step.map_or(0, |s| s + 1),
                rack.output(cv).unwrap_or(0.0),
                rack.output(gate).unwrap_or(0.0),
            );
        }
    }

    Ok(())
}
