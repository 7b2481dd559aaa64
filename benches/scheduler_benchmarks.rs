use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use beatgrid::audio::engine::{TriggerCommand, TriggerSink};
use beatgrid::audio::offline::{OfflineRenderer, RenderFormat};
use beatgrid::audio::routing::resolve_gains;
use beatgrid::sampler::Sample;
use beatgrid::sequencer::note::{Note, generate_note_id};
use beatgrid::sequencer::pattern::PatternLength;
use beatgrid::sequencer::player::{NoteSchedule, StepTiming, pattern_step_triggers, song_step_triggers};
use beatgrid::sequencer::playlist::Arrangement;
use beatgrid::sequencer::step::Step;
use beatgrid::sequencer::{EventTimeline, Pattern, StepClock, Swing, Tempo};
use beatgrid::store::PatternBank;
use std::sync::Arc;

/// Default kit with a busy groove at the given length
fn busy_pattern(id: &str, length: PatternLength) -> Pattern {
    let mut pattern = Pattern::with_default_kit(id.to_string(), id);
    pattern.length = length;
    for (index, channel) in pattern.channels.iter_mut().enumerate() {
        channel.ensure_length(length.steps());
        for step in (index % 2..length.steps()).step_by(2) {
            channel.steps[step] = Step::new((step % 4) as u8 + 1);
        }
    }
    pattern
}

/// Step dispatch for one pattern (runs once per step on the control thread)
fn bench_pattern_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_step_triggers");
    let clock = StepClock::new(Tempo::new(128.0), Swing::new(0.3), 0.0);

    for length in [PatternLength::Steps16, PatternLength::Steps32, PatternLength::Steps64] {
        let pattern = busy_pattern("p1", length);
        let mut out = Vec::with_capacity(64);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_steps", length.steps())),
            &pattern,
            |b, pattern| {
                b.iter(|| {
                    for step in 0..pattern.length_steps() {
                        let timing = StepTiming::at(&clock, step as u64);
                        pattern_step_triggers(pattern, step, &timing, &mut out);
                        black_box(out.len());
                        out.clear();
                    }
                });
            },
        );
    }
    group.finish();
}

/// Piano-roll notes bucketed by step, then replayed
fn bench_note_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("note_schedule");

    for note_count in [16, 128, 512] {
        let mut pattern = Pattern::new("p1".to_string(), "Keys");
        let sample = beatgrid::sequencer::pattern::SampleRef::new("piano.wav", "samples/piano.wav");
        pattern.add_channel("Piano", sample);
        pattern.channels[0].notes = (0..note_count)
            .map(|i| {
                let start = (i as f64 * 0.37) % 15.5;
                Note::with_id(generate_note_id(), 48 + (i % 24) as u8, start, 0.5, 0.8)
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("build", note_count), &pattern, |b, pattern| {
            b.iter(|| black_box(NoteSchedule::build(pattern)));
        });

        let schedule = NoteSchedule::build(&pattern);
        let clock = StepClock::new(Tempo::default(), Swing::default(), 0.0);
        let mut out = Vec::new();
        group.bench_with_input(BenchmarkId::new("replay", note_count), &schedule, |b, schedule| {
            b.iter(|| {
                for step in 0..16 {
                    schedule.triggers(step, &StepTiming::at(&clock, step as u64), &mut out);
                }
                black_box(out.len());
                out.clear();
            });
        });
    }
    group.finish();
}

/// Song step resolution across a filled playlist
fn bench_song_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("song_step_triggers");
    let patterns = PatternBank::new(vec![
        busy_pattern("a", PatternLength::Steps16),
        busy_pattern("b", PatternLength::Steps32),
        busy_pattern("c", PatternLength::Steps64),
    ]);
    let clock = StepClock::new(Tempo::new(140.0), Swing::default(), 0.0);

    for placements in [8usize, 64, 256] {
        let mut arrangement = Arrangement::default();
        for i in 0..placements {
            let id = ["a", "b", "c"][i % 3];
            arrangement.playlist.place(&patterns, i % 4, (i / 4) * 4, id);
        }
        let steps = (arrangement.song_length_bars(&patterns) * 16.0) as usize;
        let mut out = Vec::with_capacity(64);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{placements}_placements")),
            &arrangement,
            |b, arrangement| {
                b.iter(|| {
                    for step in 0..steps {
                        let timing = StepTiming::at(&clock, step as u64);
                        black_box(song_step_triggers(&patterns, arrangement, step, &timing, &mut out));
                        out.clear();
                    }
                });
            },
        );
    }
    group.finish();
}

/// Timeline insert and drain, as the transport does on every tick
fn bench_event_timeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_timeline");

    for events in [64u64, 1024, 8192] {
        group.bench_with_input(BenchmarkId::from_parameter(events), &events, |b, &events| {
            b.iter(|| {
                let mut timeline = EventTimeline::new();
                for i in 0..events {
                    // Interleaved times exercise the ordering
                    timeline.schedule(((i * 7919) % events) as f64 * 0.01, i);
                }
                let mut now = 0.0;
                while !timeline.is_empty() {
                    now += 0.5;
                    while let Some(entry) = timeline.pop_due(now) {
                        black_box(entry);
                    }
                }
            });
        });
    }
    group.finish();
}

/// Mixer gain resolution for mute/solo
fn bench_resolve_gains(c: &mut Criterion) {
    let pattern = busy_pattern("p1", PatternLength::Steps16);
    let mut channels: Vec<_> = (0..8).flat_map(|_| pattern.channels.iter().cloned()).collect();
    channels[3].is_soloed = true;

    c.bench_function("resolve_gains_40_channels", |b| {
        b.iter(|| black_box(resolve_gains(&channels)));
    });
}

/// Offline mix of one busy bar (export path)
fn bench_offline_render(c: &mut Criterion) {
    let sample_rate = 44100;
    let sample = Arc::new(Sample::new(
        "tone",
        sample_rate,
        1,
        (0..4410).map(|i| (i as f32 * 0.05).sin() * 0.5).collect(),
    ));

    c.bench_function("offline_render_one_bar", |b| {
        b.iter(|| {
            let mut renderer = OfflineRenderer::new(RenderFormat::new(sample_rate, 2));
            renderer.load_sample("tone", Arc::clone(&sample));
            for step in 0..16 {
                renderer.send(TriggerCommand::AttackRelease {
                    channel: "ch".to_string(),
                    sample: "tone".to_string(),
                    pitch: 60,
                    velocity: 0.8,
                    duration: 0.125,
                    time: step as f64 * 0.125,
                });
            }
            black_box(renderer.render(2.0, &mut |_| {}))
        });
    });
}

criterion_group!(
    benches,
    bench_pattern_steps,
    bench_note_schedule,
    bench_song_steps,
    bench_event_timeline,
    bench_resolve_gains,
    bench_offline_render
);
criterion_main!(benches);
