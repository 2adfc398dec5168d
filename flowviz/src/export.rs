// THEORY:
// Rendering a flow animation is cheap per frame; encoding and writing the
// frames is not. The `ExportPool` moves that work off the caller: a dispatcher
// task hands each frame, round-robin, to one of N worker tasks, and each worker
// runs the PNG encode on tokio's blocking pool and replies on a oneshot
// channel. Callers await the replies in submission order, so the returned
// paths line up with the frames even though writes finish out of order.

use crate::error::{Error, Result};
use futures::future::try_join_all;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

pub struct ExportTask {
    pub image: RgbaImage,
    pub path: PathBuf,
    pub result_sender: oneshot::Sender<Result<PathBuf>>,
}

pub struct ExportPool {
    task_sender: mpsc::UnboundedSender<ExportTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    worker_count: usize,
}

impl ExportPool {
    /// Spawns `worker_count` workers (at least one). Must be called inside a tokio runtime.
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<ExportTask>();
        let mut workers = Vec::with_capacity(worker_count + 1);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) =
            (0..worker_count).map(|_| mpsc::unbounded_channel::<ExportTask>()).unzip();

        workers.push(tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        }));

        for (id, mut worker_receiver) in worker_receivers.into_iter().enumerate() {
            workers.push(tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let ExportTask { image, path, result_sender } = task;
                    let result = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
                        image.save(&path)?;
                        Ok(path)
                    })
                    .await
                    .map_err(|e| Error::export(format!("export worker {id} panicked: {e}")))
                    .and_then(|r| r);
                    if let Ok(path) = &result {
                        debug!(worker = id, path = %path.display(), "frame written");
                    }
                    let _ = result_sender.send(result);
                }
            }));
        }

        Self { task_sender, workers, worker_count }
    }

    /// One worker per CPU.
    pub fn with_default_workers() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Encodes `image` to `path` (format from the extension) on a worker.
    pub async fn write_image(&self, image: RgbaImage, path: PathBuf) -> Result<PathBuf> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.task_sender
            .send(ExportTask { image, path, result_sender })
            .map_err(|_| Error::export("failed to send frame to export pool"))?;
        result_receiver
            .await
            .map_err(|_| Error::export("export worker dropped the frame"))?
    }

    /// Writes every frame as `<dir>/<prefix>_<index:04>.png`, returning paths in frame order.
    pub async fn write_frames(&self, frames: Vec<RgbaImage>, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(dir).await?;
        let pending = frames
            .into_iter()
            .enumerate()
            .map(|(i, image)| self.write_image(image, dir.join(format!("{prefix}_{i:04}.png"))));
        try_join_all(pending).await
    }

    /// Stops accepting work and waits for the workers to drain.
    pub async fn shutdown(self) {
        let Self { task_sender, workers, .. } = self;
        drop(task_sender);
        for worker in workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[tokio::test]
    async fn writes_frames_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ExportPool::new(3);
        assert_eq!(pool.worker_count(), 3);

        let frames: Vec<RgbaImage> = (0..5u8)
            .map(|i| RgbaImage::from_pixel(4, 2, Rgba([i * 40, 0, 0, 255])))
            .collect();
        let paths = pool.write_frames(frames, dir.path(), "flow").await.unwrap();

        assert_eq!(paths.len(), 5);
        for (i, path) in paths.iter().enumerate() {
            assert_eq!(path.file_name().unwrap().to_str().unwrap(), format!("flow_{i:04}.png"));
            let image = image::open(path).unwrap().to_rgba8();
            assert_eq!(image.get_pixel(0, 0).0, [i as u8 * 40, 0, 0, 255]);
        }
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn zero_workers_means_one() {
        let pool = ExportPool::new(0);
        assert_eq!(pool.worker_count(), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_format_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ExportPool::new(1);
        let result = pool
            .write_image(RgbaImage::new(2, 2), dir.path().join("frame.unknownext"))
            .await;
        assert!(matches!(result, Err(Error::Image(_))));
        pool.shutdown().await;
    }
}
