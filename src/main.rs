use operant::prelude::*;
use std::sync::atomic::AtomicBool;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h" || args[1] == "help") {
        print_help();
        return;
    }
    if args.len() >= 2 {
        eprintln!("Unknown command: {}", args[1]);
        print_help();
        std::process::exit(2);
    }

    // Minimal demo:
    // - one simulated subject runs the bundled curriculum
    // - habituation graduates to follow-the-light after two busy sessions
    // - stage 2 unlocks after two accurate, busy discrimination sessions
    run_curriculum_demo();
}

fn print_help() {
    println!("operant - closed-loop trial engine demo");
    println!();
    println!("USAGE:");
    println!("  operant            Run the simulated curriculum demo");
    println!("  operant --help     Show this help");
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn run_curriculum_demo() {
    let mut settings = TrainingSettings::default();
    let mut history = MemoryHistory::new("demo_subject");

    let mut calibration = CalibrationTable::new();
    calibration.set_flow(Port::Left, 0.4);
    calibration.set_flow(Port::Right, 0.5);

    let mut rig = SimulatedRig::new(0xB0B);
    // A well-trained simulated subject: responsive and strongly light-guided,
    // so the demo actually clears the 85% bar.
    rig.p_engage = 0.98;
    rig.p_follow_light = 0.92;

    let mut rng = Prng::new(0x5EED);
    let stop = AtomicBool::new(false);

    println!("operant curriculum demo");
    println!("subject=demo_subject");
    println!();

    for session_idx in 1..=8u32 {
        let task_name = settings.next_task.clone();
        let mut task = match task_for_name(&task_name) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("cannot start session: {e}");
                std::process::exit(1);
            }
        };

        let limits = SessionLimits::from_settings(&settings).with_max_trials(120);
        let started_at_ms = now_ms().saturating_add(session_idx as u64);

        let record = match run_session(
            task.as_mut(),
            &settings,
            &calibration,
            &mut rig,
            &mut rng,
            limits,
            &stop,
            started_at_ms,
        ) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("session aborted: {e}");
                std::process::exit(1);
            }
        };

        println!(
            "session={} task={} stage={} trials={} accuracy={:.3} water_ml={:.2}",
            session_idx,
            record.task,
            settings.stage,
            record.trial_count(),
            record.accuracy(),
            record.water_ml(),
        );

        history.push(record);

        let delta = update(&task_name, &settings, &history);
        if !delta.is_empty() {
            if let Some(next) = &delta.next_task {
                println!("  -> next_task={next}");
            }
            if let Some(stage) = delta.stage {
                println!("  -> stage={stage}");
            }
            if let Some(reward) = delta.reward_amount_ml {
                println!("  -> reward_amount_ml={reward:.2}");
            }
            delta.apply(&mut settings);
        }

        if settings.stage >= 2 {
            println!();
            println!("stage 2 reached after {session_idx} sessions");
            break;
        }
    }
}
