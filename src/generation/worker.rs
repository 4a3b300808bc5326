// A generator living on its own thread.
//
// The pretrained models hold tensors that are not meant to be shared between
// threads, so the generator is built on the worker thread itself and only
// prompts and images cross the channels. Requests are served one at a time.
use std::sync::{mpsc, Mutex};

use image::RgbImage;
use tracing::{debug, error};

use super::ImageGenerator;
use crate::error::Error;

struct Job {
    prompt: String,
    reply: mpsc::Sender<anyhow::Result<RgbImage>>,
}

pub struct GenerationWorker {
    jobs: Mutex<mpsc::Sender<Job>>,
}

impl GenerationWorker {
    /// Builds the generator with `factory` on a new thread, waiting until it
    /// is ready. A failing factory is reported here.
    pub fn spawn<G, F>(factory: F) -> anyhow::Result<Self>
    where
        G: ImageGenerator + 'static,
        F: FnOnce() -> anyhow::Result<G> + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<anyhow::Result<()>>();
        std::thread::Builder::new().name("generation".to_string()).spawn(move || {
            let generator = match factory() {
                Ok(generator) => {
                    let _ = ready_tx.send(Ok(()));
                    generator
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            for job in jobs_rx {
                debug!("worker received prompt {:?}", job.prompt);
                let result = generator.generate(&job.prompt);
                if let Err(err) = &result {
                    error!("generation failed: {err:#}");
                }
                // The requester may have given up waiting.
                let _ = job.reply.send(result);
            }
            debug!("generation worker shutting down");
        })?;
        ready_rx.recv().map_err(|_| Error::WorkerStopped)??;
        Ok(Self { jobs: Mutex::new(jobs_tx) })
    }
}

impl ImageGenerator for GenerationWorker {
    /// Blocks until the worker has produced the image.
    fn generate(&self, prompt: &str) -> anyhow::Result<RgbImage> {
        let (reply_tx, reply_rx) = mpsc::channel();
        let job = Job { prompt: prompt.to_string(), reply: reply_tx };
        self.jobs
            .lock()
            .map_err(|_| Error::WorkerStopped)?
            .send(job)
            .map_err(|_| Error::WorkerStopped)?;
        reply_rx.recv().map_err(|_| Error::WorkerStopped)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::rc::Rc;

    // Rc makes this generator !Send, it can only live on the worker thread.
    struct LocalGenerator {
        shade: Rc<u8>,
    }

    impl ImageGenerator for LocalGenerator {
        fn generate(&self, prompt: &str) -> anyhow::Result<RgbImage> {
            match prompt {
                "fail" => anyhow::bail!("no image for you"),
                "panic" => panic!("generator crashed"),
                _ => Ok(RgbImage::from_pixel(4, 4, Rgb([*self.shade; 3]))),
            }
        }
    }

    #[test]
    fn serves_requests_from_worker_thread() {
        let worker = GenerationWorker::spawn(|| Ok(LocalGenerator { shade: Rc::new(7) })).unwrap();
        let image = worker.generate("a prompt").unwrap();
        assert_eq!(*image.get_pixel(0, 0), Rgb([7, 7, 7]));
        assert!(worker.generate("fail").is_err());
        assert!(worker.generate("again").is_ok());
    }

    #[test]
    fn factory_failure_is_reported() {
        let result = GenerationWorker::spawn(|| -> anyhow::Result<LocalGenerator> {
            anyhow::bail!("weights not found")
        });
        let err = result.err().unwrap();
        assert!(err.to_string().contains("weights not found"));
    }

    #[test]
    fn crashed_worker_reports_stopped() {
        let worker = GenerationWorker::spawn(|| Ok(LocalGenerator { shade: Rc::new(0) })).unwrap();
        let err = worker.generate("panic").unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::WorkerStopped)));
        assert!(worker.generate("after").is_err());
    }
}
