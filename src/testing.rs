//! Test doubles and fixtures shared by the unit tests.

use crate::config::{AppConfig, Secret};
use crate::device::AcceleratorProbe;
use crate::transcription::command::CommandLine;
use crate::transcription::executor::{CommandExecutor, ProcessOutput};
use actix_web::http::header;
use actix_web::test::TestRequest;
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const WAV_HEADER_LEN: usize = 44;
pub const BOUNDARY: &str = "transcribe-test-boundary";

/// Config with a token and workspaces under `work_dir`.
pub fn test_config(work_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.transcription.hf_token = Secret::new("hf_test_token");
    config.transcription.work_dir = Some(work_dir.to_path_buf());
    config
}

/// Canonical 44-byte header of an empty 16 kHz mono PCM WAV file.
pub fn wav_bytes() -> Vec<u8> {
    let mut wav = Vec::with_capacity(WAV_HEADER_LEN);
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&36u32.to_le_bytes());
    wav.extend_from_slice(b"WAVEfmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&16_000u32.to_le_bytes());
    wav.extend_from_slice(&32_000u32.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes());
    wav.extend_from_slice(&16u16.to_le_bytes());
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&0u32.to_le_bytes());
    wav
}

pub fn png_bytes() -> Vec<u8> {
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend_from_slice(&[0, 0, 0, 13]);
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&[0u8; 17]);
    png
}

/// A single-field multipart POST to `/transcribe/`.
pub fn multipart_request(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> TestRequest {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    TestRequest::post()
        .uri("/transcribe/")
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(body)
}

/// One call seen by [`StubExecutor`].
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub working_dir_existed: bool,
    /// Contents of `--file-name` at launch time, if present
    pub input: Option<Vec<u8>>,
}

impl Invocation {
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

enum Behavior {
    Reply { code: i32, stdout: String, stderr: String },
    WriteTranscript(String),
    EchoInput,
    Sleep(Duration),
    SpawnError,
    Panic,
}

/// Stand-in for the external tool.
pub struct StubExecutor {
    pub calls: AtomicUsize,
    behavior: Behavior,
    seen: Mutex<Vec<Invocation>>,
}

impl StubExecutor {
    fn with(behavior: Behavior) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            behavior,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Exit with `code` and the given streams; writes nothing.
    pub fn replying(code: i32, stdout: &str, stderr: &str) -> Self {
        Self::with(Behavior::Reply {
            code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        })
    }

    /// Write `json` to `--transcript-path` and exit 0.
    pub fn writing_transcript(json: &str) -> Self {
        Self::with(Behavior::WriteTranscript(json.to_string()))
    }

    /// Write `{"tail": <input after the WAV header>}` and exit 0.
    pub fn echoing_input() -> Self {
        Self::with(Behavior::EchoInput)
    }

    pub fn sleeping(duration: Duration) -> Self {
        Self::with(Behavior::Sleep(duration))
    }

    pub fn failing_to_spawn() -> Self {
        Self::with(Behavior::SpawnError)
    }

    pub fn panicking() -> Self {
        Self::with(Behavior::Panic)
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.seen.lock().unwrap().clone()
    }

    pub fn last_program(&self) -> Option<String> {
        self.invocations().pop().map(|i| i.program)
    }
}

fn success() -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(0),
        stdout: String::new(),
        stderr: String::new(),
    }
}

#[async_trait]
impl CommandExecutor for StubExecutor {
    async fn run(&self, command: &CommandLine) -> io::Result<ProcessOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let input = match command.value_of("--file-name") {
            Some(path) => Some(tokio::fs::read(path).await?),
            None => None,
        };
        let invocation = Invocation {
            program: command.program().to_string(),
            args: command.get_args().to_vec(),
            working_dir: command.working_dir().map(Path::to_path_buf),
            working_dir_existed: command.working_dir().map_or(false, Path::is_dir),
            input: input.clone(),
        };
        self.seen.lock().unwrap().push(invocation);

        // Let a concurrent request get scheduled in between
        tokio::task::yield_now().await;

        let transcript_path = command.value_of("--transcript-path");
        match &self.behavior {
            Behavior::Reply { code, stdout, stderr } => Ok(ProcessOutput {
                exit_code: Some(*code),
                stdout: stdout.clone(),
                stderr: stderr.clone(),
            }),
            Behavior::WriteTranscript(json) => {
                if let Some(path) = transcript_path {
                    tokio::fs::write(path, json).await?;
                }
                Ok(success())
            }
            Behavior::EchoInput => {
                let tail = input
                    .as_deref()
                    .map(|bytes| String::from_utf8_lossy(&bytes[WAV_HEADER_LEN.min(bytes.len())..]).into_owned())
                    .unwrap_or_default();
                if let Some(path) = transcript_path {
                    tokio::fs::write(path, serde_json::json!({ "tail": tail }).to_string()).await?;
                }
                Ok(success())
            }
            Behavior::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                Ok(success())
            }
            Behavior::SpawnError => Err(io::Error::new(
                io::ErrorKind::NotFound,
                "No such file or directory",
            )),
            Behavior::Panic => panic!("stub executor exploded"),
        }
    }
}

/// Probe with a fixed answer.
pub struct StaticProbe {
    name: &'static str,
    device_id: Option<String>,
}

impl StaticProbe {
    pub fn present(name: &'static str, device_id: &str) -> Self {
        Self {
            name,
            device_id: Some(device_id.to_string()),
        }
    }

    pub fn absent(name: &'static str) -> Self {
        Self { name, device_id: None }
    }
}

#[async_trait]
impl AcceleratorProbe for StaticProbe {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn detect(&self) -> Option<String> {
        self.device_id.clone()
    }
}

/// In-memory sink for `tracing` output.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's logs into the capture until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
