use std::{error::Error, thread};

use chrono::{Duration, Local, NaiveTime, Timelike};
use clap::{Parser, Subcommand};
use roosty_reminder::{
    audio::RodioBackend,
    clock::SystemClock,
    communication::Message,
    config::Config,
    notify::DesktopNotifier,
    schedule::DailyTime,
    store::FileStore,
    trigger::ScheduleSpec,
    Capabilities, ReminderEngine, TriggerId, TriggerOptions,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// write the default config file
    Init {
        #[clap(long, short)]
        force: bool,
    },
    /// a reminder every day at HH:MM
    Add {
        time: String,
        #[clap(long, short)]
        label: Option<String>,
        #[clap(long)]
        no_sound: bool,
        #[clap(long)]
        no_vibration: bool,
    },
    /// a one time reminder some minutes from now
    In {
        minutes: i64,
        #[clap(long, short)]
        label: Option<String>,
    },
    List,
    Remove {
        id: TriggerId,
    },
    Toggle {
        id: TriggerId,
    },
    /// run the reminder engine until interrupted
    Run,
}

fn parse_time(time: &str) -> Result<DailyTime, Box<dyn Error>> {
    let time = NaiveTime::parse_from_str(time, "%H:%M")?;
    Ok(DailyTime::new(
        u8::try_from(time.hour())?,
        u8::try_from(time.minute())?,
    )?)
}

fn engine(config: &Config) -> Result<ReminderEngine, Box<dyn Error>> {
    let capabilities = Capabilities {
        clock: Box::new(SystemClock),
        store: Box::new(FileStore::in_data_dir()?),
        audio: Box::new(RodioBackend::new()),
        notifications: Box::new(DesktopNotifier::new("roosty_reminder")),
        haptics: None,
    };
    Ok(ReminderEngine::start(capabilities, config.clone()))
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    simple_file_logger::init_logger!("roosty_reminder").expect("couldn't initialize logger");

    let args = Args::parse();
    if let Some(Command::Init { force }) = args.command {
        if force || !Config::is_config_present() {
            let path = Config::config_path().ok_or("couldn't find a config directory")?;
            Config::new().save(path.clone())?;
            println!("wrote {}", path.display());
        }
        return Ok(());
    }

    let config = Config::load_or_default()?;
    let mut engine = engine(&config)?;
    match args.command {
        Some(Command::Add {
            time,
            label,
            no_sound,
            no_vibration,
        }) => {
            let mut options = TriggerOptions::new(ScheduleSpec::Daily(parse_time(&time)?))
                .sound(!no_sound)
                .vibration(!no_vibration);
            options.label = label;
            println!("{}", engine.set_trigger(options)?);
        }
        Some(Command::In { minutes, label }) => {
            let delay = Duration::try_minutes(minutes).ok_or("that delay is too long")?;
            let mut options = TriggerOptions::after(delay);
            options.label = label;
            println!("{}", engine.set_trigger(options)?);
        }
        Some(Command::List) => {
            for summary in engine.list_triggers() {
                let next = summary.next_fire.map_or_else(
                    || "off".to_string(),
                    |next| {
                        next.with_timezone(&Local)
                            .format(&config.time_format)
                            .to_string()
                    },
                );
                println!("{}  {:<20} {next:>10}  {}", summary.id, summary.title, summary.body);
            }
        }
        Some(Command::Remove { id }) => {
            if !engine.delete_trigger(id) {
                return Err(format!("no reminder {id}").into());
            }
        }
        Some(Command::Toggle { id }) => {
            if !engine.toggle_trigger(id, None) {
                return Err(format!("no reminder {id}").into());
            }
        }
        Some(Command::Run) | None => {
            let handle = engine.handle();
            // enter stops whatever is ringing, "q" quits
            thread::spawn(move || {
                for line in std::io::stdin().lines() {
                    let message = match line.as_deref().map(str::trim) {
                        Ok("q") => Message::Shutdown,
                        Ok(_) => Message::StopActiveAlert,
                        Err(_) => break,
                    };
                    let quit = matches!(message, Message::Shutdown);
                    if handle.send(message).is_err() || quit {
                        break;
                    }
                }
            });
            engine.run();
        }
        Some(Command::Init { .. }) => unreachable!("handled above"),
    }
    Ok(())
}
