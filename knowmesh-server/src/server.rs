use crate::engine::ResolutionEngine;
use crate::router;
use crate::state::AppState;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use knowmesh_core::ipc::{KnowMeshRequest, KnowMeshResponse};
use std::path::Path;
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

/// 4-byte little-endian length prefix + MessagePack payload.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder().little_endian().new_codec()
}

/// Decode one request frame and run it against `session`. Undecodable
/// frames get an error response; the session is left untouched.
pub fn handle_frame(
    frame: &[u8],
    session: &mut ResolutionEngine,
    state: &AppState,
) -> KnowMeshResponse {
    match rmp_serde::from_slice::<KnowMeshRequest>(frame) {
        Ok(request) => router::handle_request(request, session, state),
        Err(e) => {
            tracing::debug!(len = frame.len(), "Undecodable request frame");
            KnowMeshResponse::err(format!("Deserialization error: {}", e))
        }
    }
}

pub async fn run_unix_server(
    socket_path: &str,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let state = state.clone();
                tokio::spawn(async move {
                    let (read, write) = stream.into_split();
                    let mut framed_read = FramedRead::new(read, frame_codec());
                    let mut framed_write = FramedWrite::new(write, frame_codec());

                    // One conversation per connection.
                    let mut session = ResolutionEngine::for_session(&state);

                    while let Some(frame) = framed_read.next().await {
                        let bytes_mut = match frame {
                            Ok(b) => b,
                            Err(e) => {
                                tracing::error!("Frame error: {}", e);
                                break;
                            }
                        };

                        // Store calls lock a std mutex and may touch disk.
                        let frame_state = state.clone();
                        let turn = tokio::task::spawn_blocking(move || {
                            let response = handle_frame(&bytes_mut, &mut session, &frame_state);
                            (response, session)
                        })
                        .await;
                        let response = match turn {
                            Ok((response, returned)) => {
                                session = returned;
                                response
                            }
                            Err(e) => {
                                tracing::error!("Request handler failed: {}", e);
                                return;
                            }
                        };
                        match rmp_serde::to_vec_named(&response) {
                            Ok(resp_bytes) => {
                                if let Err(e) = framed_write.send(Bytes::from(resp_bytes)).await {
                                    tracing::error!("Failed to send response: {}", e);
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to serialize response: {}", e);
                                break;
                            }
                        }
                    }
                    tracing::debug!(turns = session.transcript().len(), "IPC session closed");
                });
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}
