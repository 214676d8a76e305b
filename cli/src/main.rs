use clap::{Parser, Subcommand};
use hound::WavSpec;
use softmodem_core::pcm::pack_samples;
use softmodem_core::{CallState, Modem, ANSWER_TONE_FREQ};
use std::fs::File;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "softmodem")]
#[command(about = "Audio-coupled FSK data modem")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-connect two modems in memory and exchange messages
    Simulate {
        /// Message sent by the originating modem
        #[arg(long, default_value = "HELLO FROM CALLER")]
        call_message: String,

        /// Message sent back by the answering modem
        #[arg(long, default_value = "HELLO FROM ANSWERER")]
        answer_message: String,

        /// Sample rate of the simulated audio line
        #[arg(long, default_value = "8000")]
        sample_rate: u32,

        /// Optional WAV dump of the originating modem's transmit audio
        #[arg(long, value_name = "CALLER.WAV")]
        caller_wav: Option<PathBuf>,

        /// Optional WAV dump of the answering modem's transmit audio
        #[arg(long, value_name = "ANSWERER.WAV")]
        answerer_wav: Option<PathBuf>,
    },

    /// Write the 2100 Hz answer tone to a WAV file
    AnswerTone {
        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Tone duration in seconds
        #[arg(short, long, default_value = "3")]
        seconds: u32,

        /// Sample rate of the generated audio
        #[arg(long, default_value = "8000")]
        sample_rate: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            call_message,
            answer_message,
            sample_rate,
            caller_wav,
            answerer_wav,
        } => simulate_command(
            &call_message,
            &answer_message,
            sample_rate,
            caller_wav.as_deref(),
            answerer_wav.as_deref(),
        )?,
        Commands::AnswerTone {
            output,
            seconds,
            sample_rate,
        } => answer_tone_command(&output, seconds, sample_rate)?,
    }

    Ok(())
}

fn simulate_command(
    call_message: &str,
    answer_message: &str,
    sample_rate: u32,
    caller_wav: Option<&std::path::Path>,
    answerer_wav: Option<&std::path::Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (caller, caller_rx) = Modem::new(sample_rate);
    let (answerer, answerer_rx) = Modem::new(sample_rate);
    caller.call();
    answerer.answer();

    let block = 256usize;
    let mut to_answerer = vec![0.0f32; block];
    let mut to_caller = vec![0.0f32; block];
    let mut caller_audio = Vec::new();
    let mut answerer_audio = Vec::new();

    // Pump audio both ways until the handshake converges.
    let handshake_budget = sample_rate as usize * 30;
    let mut processed = 0usize;
    while processed < handshake_budget {
        answerer.pull_samples(&mut to_caller);
        caller.push_samples(&pack_samples(&to_caller));
        caller.pull_samples(&mut to_answerer);
        answerer.push_samples(&pack_samples(&to_answerer));
        caller_audio.extend_from_slice(&to_answerer);
        answerer_audio.extend_from_slice(&to_caller);
        processed += block;
        if caller.state() == CallState::Data && answerer.state() == CallState::Data {
            break;
        }
    }

    if caller.state() != CallState::Data || answerer.state() != CallState::Data {
        return Err(format!(
            "handshake did not converge (caller {:?}, answerer {:?})",
            caller.state(),
            answerer.state()
        )
        .into());
    }
    println!(
        "Handshake converged after {:.2} s of line time",
        processed as f64 / sample_rate as f64
    );

    caller.send_bytes(call_message.as_bytes())?;
    answerer.send_bytes(answer_message.as_bytes())?;

    // Let the payload bits cross, plus a little idle tail.
    let payload_samples = sample_rate as usize * 5;
    for _ in 0..payload_samples / block {
        answerer.pull_samples(&mut to_caller);
        caller.push_samples(&pack_samples(&to_caller));
        caller.pull_samples(&mut to_answerer);
        answerer.push_samples(&pack_samples(&to_answerer));
        caller_audio.extend_from_slice(&to_answerer);
        answerer_audio.extend_from_slice(&to_caller);
    }

    let at_answerer: Vec<u8> = answerer_rx.try_iter().collect();
    let at_caller: Vec<u8> = caller_rx.try_iter().collect();
    println!(
        "Answerer received: {:?}",
        String::from_utf8_lossy(&at_answerer)
    );
    println!("Caller received: {:?}", String::from_utf8_lossy(&at_caller));

    if let Some(path) = caller_wav {
        write_wav(path, sample_rate, &caller_audio)?;
        println!("Wrote caller audio to {}", path.display());
    }
    if let Some(path) = answerer_wav {
        write_wav(path, sample_rate, &answerer_audio)?;
        println!("Wrote answerer audio to {}", path.display());
    }

    Ok(())
}

fn answer_tone_command(
    output: &std::path::Path,
    seconds: u32,
    sample_rate: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let (modem, _rx) = Modem::new(sample_rate);
    modem.answer();

    // The render automaton swaps generators at block boundaries, so the
    // first pulled block is the initial silence; consume it before
    // recording the tone.
    let mut pad = vec![0.0f32; 16];
    modem.pull_samples(&mut pad);

    let total = (sample_rate * seconds) as usize;
    let mut samples = vec![0.0f32; total];
    modem.pull_samples(&mut samples);
    println!(
        "Generated {} samples of {} Hz answer tone",
        samples.len(),
        ANSWER_TONE_FREQ
    );

    write_wav(output, sample_rate, &samples)?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn write_wav(
    path: &std::path::Path,
    sample_rate: u32,
    samples: &[f32],
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let file = File::create(path)?;
    let mut writer = hound::WavWriter::new(file, spec)?;
    for &sample in samples {
        let clamped = sample.max(-1.0).min(1.0);
        writer.write_sample((clamped * 32767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
