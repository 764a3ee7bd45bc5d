use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use vorbis_stream::cli::{CliApp, Commands, StatusDisplay};
use vorbis_stream::config::{ConfigManager, DecoderConfig, PlayerConfig};
use vorbis_stream::engine::VorbisEngine;
use vorbis_stream::logging::{self, StreamEventLog};
use vorbis_stream::output::{self, FramePlayer};
use vorbis_stream::{Decoder, FrameReceiver, PlayerError, StreamError, StreamInfo};

/// Application controller that wires decoder, output and terminal together
struct AppController {
    config: PlayerConfig,
    events: StreamEventLog,
}

impl AppController {
    fn new() -> Self {
        let config = match ConfigManager::new() {
            Ok(manager) => {
                debug!("Configuration loaded from {}", manager.config_path().display());
                manager.get_config().clone()
            }
            Err(e) => {
                StatusDisplay::display_simple_error(&PlayerError::Config(e));
                PlayerConfig::default()
            }
        };

        if let Err(e) = logging::init(&config.log_level) {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        Self {
            config,
            events: StreamEventLog::new(),
        }
    }

    fn execute_command(&self, command: Commands) -> Result<(), PlayerError> {
        match command {
            Commands::Info { path } => {
                let (decoder, info) = self.open(&path, None)?;
                decoder.close();
                StatusDisplay::display_file_info(&info);
                Ok(())
            }
            Commands::Play {
                path,
                device,
                samples_per_channel,
            } => {
                let device = device.or_else(|| self.config.preferred_device.clone());
                self.play(&path, device.as_deref(), samples_per_channel)
            }
            Commands::Decode {
                path,
                output,
                samples_per_channel,
            } => {
                let out = File::create(CliApp::expand_path(&output.to_string_lossy()))?;
                self.decode_to(&path, out, samples_per_channel)
            }
            Commands::Devices => {
                let devices = output::list_output_devices()?;
                if devices.is_empty() {
                    println!("No audio output devices found");
                }
                for name in devices {
                    println!("{}", name);
                }
                Ok(())
            }
        }
    }

    fn open(
        &self,
        path: &str,
        samples_per_channel: Option<usize>,
    ) -> Result<(Arc<Decoder>, StreamInfo), PlayerError> {
        let source: Box<dyn Read + Send> = if CliApp::is_stdin(path) {
            Box::new(io::stdin())
        } else {
            Box::new(BufReader::new(File::open(CliApp::expand_path(path))?))
        };

        let mut config: DecoderConfig = self.config.decoder.clone();
        if let Some(samples) = samples_per_channel {
            config.samples_per_channel = samples;
        }

        let (decoder, info) = Decoder::open_with(source, VorbisEngine::new(), config)?;
        info!("Opened {}: {}", path, info.format_description());
        decoder.set_error_handler(self.events.handler());
        Ok((Arc::new(decoder), info))
    }

    fn play(
        &self,
        path: &str,
        device: Option<&str>,
        samples_per_channel: Option<usize>,
    ) -> Result<(), PlayerError> {
        let (decoder, info) = self.open(path, samples_per_channel)?;
        StatusDisplay::display_file_info(&info);

        let player = match FramePlayer::new(decoder.frames(), &info, device) {
            Ok(player) => player,
            Err(e) => {
                decoder.close();
                return Err(e.into());
            }
        };

        let interrupt = Arc::clone(&decoder);
        if let Err(e) = ctrlc::set_handler(move || {
            println!("\nStopping...");
            interrupt.close();
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        let handle = decoder.spawn()?;
        if let Err(e) = player.play() {
            decoder.close();
            join_decode_task(handle)?;
            return Err(e.into());
        }
        player.wait();

        let result = join_decode_task(handle);
        println!(
            "{}",
            StatusDisplay::playback_summary(player.samples_played(), &info, &self.events)
        );
        result
    }

    fn decode_to(
        &self,
        path: &str,
        out: File,
        samples_per_channel: Option<usize>,
    ) -> Result<(), PlayerError> {
        let (decoder, info) = self.open(path, samples_per_channel)?;
        let frames = decoder.frames();
        let handle = decoder.spawn()?;

        let mut writer = BufWriter::new(out);
        let written = write_frames(&frames, &mut writer);

        let samples = match written {
            Ok(samples) => samples,
            Err(e) => {
                error!("Writing PCM failed: {}", e);
                decoder.close();
                join_decode_task(handle)?;
                return Err(e.into());
            }
        };

        let result = join_decode_task(handle);
        eprintln!(
            "{}",
            StatusDisplay::playback_summary(samples, &info, &self.events)
        );
        result
    }
}

/// Drain the channel as little-endian f32, returning samples per channel written
fn write_frames<W: Write>(frames: &FrameReceiver, writer: &mut W) -> io::Result<u64> {
    let mut samples = 0u64;
    for frame in frames {
        for value in frame.to_interleaved() {
            writer.write_all(&value.to_le_bytes())?;
        }
        samples += frame.len() as u64;
    }
    writer.flush()?;
    Ok(samples)
}

fn join_decode_task(handle: JoinHandle<Result<(), StreamError>>) -> Result<(), PlayerError> {
    match handle.join() {
        Ok(result) => result.map_err(PlayerError::from),
        Err(_) => Err(StreamError::Io(io::Error::new(io::ErrorKind::Other, "decode task panicked")).into()),
    }
}

fn main() {
    let cli = CliApp::parse();
    let app = AppController::new();

    if let Err(e) = app.execute_command(cli.command) {
        error!("Command failed: {}", e);
        StatusDisplay::display_error(&e);
        std::process::exit(1);
    }

    info!("Application shutdown complete");
}
