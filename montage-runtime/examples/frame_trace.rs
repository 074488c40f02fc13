use montage_runtime::{
    AnimationRuntime, CompositeSection, MontageData, MontageInstanceId, NotifyEvent,
    RootMotionKey, RootMotionMode, RootMotionTrack, RuntimeConfig, Transform,
};
use std::collections::HashMap;
use std::sync::Arc;

fn print_usage_and_exit() -> ! {
    eprintln!(
        "Usage:\n  frame_trace <commands...>\n\nCommands:\n  --seed <u64>\n  --server\n  --root-motion <none|ignore|everything|montages>\n  --threads <n>\n  --montage <name> <length> <slot> <blendIn> <blendOut>\n  --group <montage> <group>\n  --section <montage> <name> <start> [next]\n  --notify <montage> <name> <time> [duration]\n  --chance <montage> <notify> <chance>\n  --dash <montage> <distance>\n  --play <montage> [rate]\n  --stop <montage> <blendOut>\n  --jump <montage> <section>\n  --follow <follower> <leader>\n  --lod <lod>\n  --step <dt> [count]\n  --consume <alpha>\n"
    );
    std::process::exit(2);
}

fn parse_root_motion_mode(s: &str) -> Option<RootMotionMode> {
    match s {
        "none" => Some(RootMotionMode::NoExtraction),
        "ignore" => Some(RootMotionMode::IgnoreRootMotion),
        "everything" => Some(RootMotionMode::RootMotionFromEverything),
        "montages" => Some(RootMotionMode::RootMotionFromMontagesOnly),
        _ => None,
    }
}

fn asset<'a>(assets: &'a mut HashMap<String, MontageData>, name: &str) -> &'a mut MontageData {
    assets
        .get_mut(name)
        .unwrap_or_else(|| panic!("unknown montage '{name}' (declare it with --montage)"))
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage_and_exit();
    }

    // Configuration flags come first; the runtime is built on the first playback command.
    let mut config = RuntimeConfig::default();
    let mut threads = 0usize;
    let mut assets: HashMap<String, MontageData> = HashMap::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--seed" if i + 1 < args.len() => {
                config.notify_seed = args[i + 1].parse().expect("seed");
                i += 2;
            }
            "--server" => {
                config.dedicated_server = true;
                i += 1;
            }
            "--root-motion" if i + 1 < args.len() => {
                config.root_motion_mode =
                    parse_root_motion_mode(&args[i + 1]).unwrap_or_else(|| print_usage_and_exit());
                i += 2;
            }
            "--threads" if i + 1 < args.len() => {
                threads = args[i + 1].parse().expect("threads");
                i += 2;
            }
            "--montage" if i + 5 < args.len() => {
                let name = args[i + 1].clone();
                let length: f32 = args[i + 2].parse().expect("length");
                let blend_in: f32 = args[i + 4].parse().expect("blend in");
                let blend_out: f32 = args[i + 5].parse().expect("blend out");
                let montage = MontageData::new(name.as_str(), length)
                    .with_slots([args[i + 3].as_str()])
                    .with_blend_times(blend_in, blend_out);
                assets.insert(name, montage);
                i += 6;
            }
            "--group" if i + 2 < args.len() => {
                asset(&mut assets, &args[i + 1]).group = Some(args[i + 2].clone());
                i += 3;
            }
            "--section" if i + 3 < args.len() => {
                let start: f32 = args[i + 3].parse().expect("section start");
                let mut section = CompositeSection::new(args[i + 2].as_str(), start);
                let mut used = 4;
                if let Some(next) = args.get(i + 4).filter(|a| !a.starts_with("--")) {
                    section = section.with_next(next.as_str());
                    used += 1;
                }
                let montage = asset(&mut assets, &args[i + 1]);
                // The first declared section replaces the implicit default one.
                if montage.sections.len() == 1 && montage.sections[0].name == "Default" {
                    montage.sections.clear();
                }
                montage.sections.push(section);
                i += used;
            }
            "--notify" if i + 3 < args.len() => {
                let time: f32 = args[i + 3].parse().expect("notify time");
                let mut used = 4;
                let event = match args.get(i + 4).and_then(|a| a.parse::<f32>().ok()) {
                    Some(duration) => {
                        used += 1;
                        NotifyEvent::state(args[i + 2].as_str(), time, duration)
                    }
                    None => NotifyEvent::one_shot(args[i + 2].as_str(), time),
                };
                asset(&mut assets, &args[i + 1]).notifies.push(Arc::new(event));
                i += used;
            }
            "--chance" if i + 3 < args.len() => {
                let chance: f32 = args[i + 3].parse().expect("chance");
                let montage = asset(&mut assets, &args[i + 1]);
                let notify = montage
                    .notifies
                    .iter_mut()
                    .find(|n| n.name == args[i + 2])
                    .expect("--chance requires a preceding --notify");
                Arc::make_mut(notify).trigger_chance = chance;
                i += 4;
            }
            "--dash" if i + 2 < args.len() => {
                let distance: f32 = args[i + 2].parse().expect("distance");
                let montage = asset(&mut assets, &args[i + 1]);
                montage.root_motion = Some(RootMotionTrack::new(vec![
                    RootMotionKey {
                        time: 0.0,
                        transform: Transform::IDENTITY,
                    },
                    RootMotionKey {
                        time: montage.length,
                        transform: Transform::from_translation(glam::Vec3::new(
                            distance, 0.0, 0.0,
                        )),
                    },
                ]));
                i += 3;
            }
            _ => break,
        }
    }

    let mut rt = AnimationRuntime::new(config).expect("runtime config");
    if threads > 0 {
        let pool = montage_runtime::build_worker_pool(threads).expect("worker pool");
        rt = rt.with_worker_pool(pool);
    }
    rt.on_montage_started("trace", |e| {
        println!("  event started {} ({})", e.montage.name, e.instance);
        Ok(())
    });
    rt.on_montage_blending_out("trace", |e| {
        println!(
            "  event blending-out {} interrupted={}",
            e.montage.name, e.interrupted
        );
        Ok(())
    });
    rt.on_montage_ended("trace", |e| {
        println!("  event ended {} interrupted={}", e.montage.name, e.interrupted);
        Ok(())
    });
    rt.on_notify("trace", |n| {
        println!("  notify {:?} {} w={:.3}", n.phase, n.event.name, n.weight);
        Ok(())
    });

    let shared: HashMap<String, Arc<MontageData>> = assets
        .into_iter()
        .map(|(name, montage)| (name, Arc::new(montage)))
        .collect();
    let mut playing: HashMap<String, MontageInstanceId> = HashMap::new();
    let mut total_time = 0.0f32;

    while i < args.len() {
        match args[i].as_str() {
            "--play" if i + 1 < args.len() => {
                let name = args[i + 1].as_str();
                let mut used = 2;
                let rate = match args.get(i + 2).and_then(|a| a.parse::<f32>().ok()) {
                    Some(rate) => {
                        used += 1;
                        rate
                    }
                    None => 1.0,
                };
                let montage = shared
                    .get(name)
                    .unwrap_or_else(|| panic!("unknown montage '{name}'"));
                let id = rt.play_montage(Arc::clone(montage), rate).expect("play montage");
                println!("play {name} as {id} rate={rate}");
                playing.insert(name.to_string(), id);
                i += used;
            }
            "--stop" if i + 2 < args.len() => {
                let blend_out: f32 = args[i + 2].parse().expect("blend out");
                let id = playing[args[i + 1].as_str()];
                if let Err(e) = rt.stop_montage(id, blend_out) {
                    println!("stop {}: {e}", args[i + 1]);
                }
                i += 3;
            }
            "--jump" if i + 2 < args.len() => {
                let id = playing[args[i + 1].as_str()];
                if let Err(e) = rt.jump_to_section(id, &args[i + 2]) {
                    println!("jump {}: {e}", args[i + 1]);
                }
                i += 3;
            }
            "--follow" if i + 2 < args.len() => {
                let follower = playing[args[i + 1].as_str()];
                let leader = playing[args[i + 2].as_str()];
                if let Err(e) = rt.montage_sync_follow(follower, leader) {
                    println!("follow {}: {e}", args[i + 1]);
                }
                i += 3;
            }
            "--lod" if i + 1 < args.len() => {
                rt.set_predicted_lod(args[i + 1].parse().expect("lod"));
                i += 2;
            }
            "--consume" if i + 1 < args.len() => {
                let alpha: f32 = args[i + 1].parse().expect("alpha");
                let motion = rt.consume_root_motion(alpha);
                println!(
                    "root motion t=({:.4}, {:.4}, {:.4})",
                    motion.translation.x, motion.translation.y, motion.translation.z
                );
                i += 2;
            }
            "--step" if i + 1 < args.len() => {
                let dt: f32 = args[i + 1].parse().expect("dt");
                let mut used = 2;
                let count = match args.get(i + 2).and_then(|a| a.parse::<usize>().ok()) {
                    Some(count) => {
                        used += 1;
                        count
                    }
                    None => 1,
                };
                for _ in 0..count {
                    total_time += dt;
                    println!("frame t={total_time:.4}");
                    rt.pre_update(dt).expect("pre update");
                    rt.dispatch_update(dt).expect("update");
                    let snapshot = rt.current_snapshot().expect("snapshot");
                    for record in snapshot.montages() {
                        println!(
                            "  {} {} w={:.4} p={:.4} playing={}",
                            record.instance,
                            record.montage.name,
                            record.weight,
                            record.position,
                            record.playing
                        );
                    }
                    for (curve, value) in snapshot.curves() {
                        println!("  curve {curve}={value:.4}");
                    }
                    for slot in snapshot.slots() {
                        println!(
                            "  slot {} local={:.4} global={:.4}",
                            slot.slot, slot.local_weight, slot.global_weight
                        );
                    }
                    let report = rt.post_update().expect("post update");
                    for failure in &report.failures {
                        println!("  failure {failure}");
                    }
                }
                i += used;
            }
            _ => print_usage_and_exit(),
        }
    }
}
