//! session/files.rs: centralized transfers through the server's files directory.
use tokio::{
    fs::{self, File},
    io::{self, AsyncBufRead, AsyncWriteExt, BufWriter},
};
use tracing::{info, warn};

use super::Session;
use crate::{
    error::AppResult,
    protocol::{self as p, stored_name},
    transfer::{receive_stream, send_stream},
};

const UPLOAD_FAILED: &str = "Upload failed, the server could not store the file.";

impl<R: AsyncBufRead + Unpin> Session<R> {
    /* ---------------- client → server ---------------- */
    pub(super) async fn receive_upload(&mut self, path: &str) -> AppResult<()> {
        let Some(file) = stored_name(path) else {
            return self.reply(p::NO_SUCH_FILE).await;
        };
        let dest = self.app.files_dir.join(&file);
        let target = match fs::create_dir_all(&self.app.files_dir).await {
            Ok(())  => File::create(&dest).await,
            Err(e)  => Err(e),
        };

        self.reply(p::READY_TO_RECEIVE).await?;
        // raw bytes from here on; no line is read until the sentinel shows up
        let n = match target {
            Ok(f) => {
                let mut out = BufWriter::new(f);
                match receive_stream(&mut self.reader, &mut out).await {
                    Ok(n) => n,
                    Err(e) => {
                        // never announced, so nobody may fetch the stub
                        drop(out);
                        let _ = fs::remove_file(&dest).await;
                        warn!(id = %self.id, path = %dest.display(), error = %e, "upload cut short, removed");
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                warn!(id = %self.id, path = %dest.display(), error = %e, "cannot store upload, draining");
                receive_stream(&mut self.reader, &mut io::sink()).await?;
                return self.reply(UPLOAD_FAILED).await;
            }
        };

        info!(id = %self.id, name = %self.name, %file, bytes = n, "upload stored");
        self.broadcast(&p::uploaded_notice(&self.name, &file)).await;
        Ok(())
    }

    /* ---------------- server → client ---------------- */
    pub(super) async fn send_download(&mut self, name: &str) -> AppResult<()> {
        let Some(file) = stored_name(name) else {
            return self.reply(p::NO_SUCH_FILE).await;
        };
        let path = self.app.files_dir.join(&file);
        let mut src = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => match File::open(&path).await {
                Ok(f)  => f,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot open stored file");
                    return self.reply(p::NO_SUCH_FILE).await;
                }
            },
            _ => return self.reply(p::NO_SUCH_FILE).await,
        };

        // holding the writer keeps broadcasts from landing inside the file bytes
        let mut w = self.writer.lock().await;
        w.write_all(format!("{}\n", p::READY_TO_SEND).as_bytes()).await?;
        let n = send_stream(&mut src, &mut *w).await?;
        drop(w);

        info!(id = %self.id, addr = %self.addr, %file, bytes = n, "download sent");
        Ok(())
    }
}
