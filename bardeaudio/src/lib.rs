#![doc = r#"
BardeAudio - Pipeline de transcodage vers frames vocales

Cette crate transforme un média résolu (voir `bardesource`) en une séquence
de frames opus de durée fixe, prêtes pour un transport vocal temps réel.

# Architecture

Le pipeline est composé d'étages asynchrones qui communiquent via des
channels Tokio bornés et partagent un `CancellationToken` :

```text
Fetch (HTTP) → Decode (symphonia) → Resample (soxr) → Encode (opus)
                                                           ↓
                                                      FrameSource
                                                           ↓
                                                   PacedSink → transport
```

- **Fetch** : streaming chunké, jamais de média complet en mémoire, délai
  de stall borné
- **Decode** : task bloquante, PCM stéréo f32 au rate de la source ;
  la reprise à un offset jette les échantillons décodés avant l'offset
- **Resample** : normalise vers le sample rate cible
- **Encode** : fenêtres d'exactement une durée de frame, gain appliqué,
  opus

# Backpressure

La production est régulée par la profondeur des channels : un sink à
l'arrêt suspend toute la chaîne jusqu'au fetch. Le pacing de livraison est
le travail du sink ([`PacedSink`]), pas du pipeline.

# Exemple

```no_run
use bardeaudio::{FrameSourceFactory, OpenOptions, TranscodePipeline};
use bardesource::MediaDescriptor;

# async fn example(descriptor: MediaDescriptor) -> Result<(), Box<dyn std::error::Error>> {
let pipeline = TranscodePipeline::from_config();
let mut source = pipeline.open(&descriptor, OpenOptions::default()).await?;

while let Some(frame) = source.next_frame().await? {
    // livrer au sink
    let _ = frame;
}
# Ok(())
# }
```
"#]

mod decode;
mod encode;
mod error;
mod fetch;
mod frame;
mod pipeline;
mod resample;
mod sink;
mod volume;

pub use error::{PipelineError, SinkError};
pub use frame::{FrameFormat, FramePacket, PcmBlock};
pub use pipeline::{FrameSource, FrameSourceFactory, OpenOptions, TranscodePipeline};
pub use sink::{CollectorSink, FrameSink, PacedSink};
pub use volume::{VolumeControl, MAX_GAIN};
