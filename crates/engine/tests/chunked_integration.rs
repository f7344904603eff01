//! End-to-end test: a `StartDownload` command results in a fully
//! assembled file on disk and a `DownloadComplete` event, driven entirely
//! through the public `Engine`/`EngineHandle` surface.

use engine::{ClientCommand, Engine, EngineEvent};
use storage::Config;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves byte ranges out of a fixed buffer, honoring the `Range` header
/// the way a real ranged-fetch origin would.
struct RangedBody(Vec<u8>);

impl Respond for RangedBody {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let range = request
            .headers
            .get("Range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .expect("worker always sends a Range header");

        let (start, end) = range.split_once('-').expect("range has a dash");
        let start: usize = start.parse().unwrap();
        let end: usize = end.parse().unwrap();

        ResponseTemplate::new(206).set_body_bytes(self.0[start..=end].to_vec())
    }
}

#[tokio::test]
async fn start_download_runs_to_completion_and_assembles_the_file() {
    let body = (0u16..400).map(|b| (b % 256) as u8).collect::<Vec<u8>>();
    let server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/a.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("accept-ranges", "bytes")
                .insert_header("content-length", body.len().to_string()),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a.bin"))
        .respond_with(RangedBody(body.clone()))
        .mount(&server)
        .await;

    let download_dir = tempfile::tempdir().unwrap();
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config { download_folder: download_dir.path().to_path_buf(), temp_folder: temp_dir.path().to_path_buf() };

    let (engine, handle) = Engine::new(&config).await;
    tokio::spawn(engine.run());

    let (mut events, _) = handle.subscribe().await;
    assert!(handle.send(ClientCommand::StartDownload { url: format!("{}/a.bin", server.uri()) }).await);

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    loop {
        assert!(tokio::time::Instant::now() < deadline, "download did not complete in time");
        match tokio::time::timeout(std::time::Duration::from_secs(1), events.recv()).await {
            Ok(Ok(EngineEvent::DownloadComplete { file_path, .. })) => {
                let written = tokio::fs::read(&file_path).await.unwrap();
                assert_eq!(written, body);
                break;
            }
            Ok(Ok(EngineEvent::DownloadError { error, .. })) => panic!("download failed: {error}"),
            _ => continue,
        }
    }
}
