use crate::{
    device::{
        backend::VideoDevice,
        types::{DynamicRange, VideoContextId, VideoProcessorId},
    },
    foundation::core::PixelSize,
    overlay::support::OverlaySupport,
};

/// A video context plus the processor last created on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoProcessorWrapper {
    pub context: VideoContextId,
    pub processor: Option<VideoProcessorId>,
    pub input_size: PixelSize,
    pub output_size: PixelSize,
}

/// Two-slot cache (SDR, HDR) of video processors shared by every presenter of a tree.
///
/// A processor is reused while its configured input and output sizes each cover the request;
/// otherwise only the processor is rebuilt and the context is kept.
#[derive(Debug, Default)]
pub struct VideoProcessorCache {
    entries: [Option<VideoProcessorWrapper>; 2],
}

impl VideoProcessorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, range: DynamicRange) -> Option<&VideoProcessorWrapper> {
        self.entries[range.index()].as_ref()
    }

    /// Return the wrapper for `range`, creating its video context on first use.
    pub fn get_or_create_video_processor<D: VideoDevice + ?Sized>(
        &mut self,
        device: &mut D,
        support: &OverlaySupport,
        range: DynamicRange,
    ) -> Option<&mut VideoProcessorWrapper> {
        let slot = &mut self.entries[range.index()];
        if slot.is_none() {
            match device.create_video_context(range) {
                Ok(context) => {
                    *slot = Some(VideoProcessorWrapper {
                        context,
                        processor: None,
                        input_size: PixelSize::default(),
                        output_size: PixelSize::default(),
                    });
                }
                Err(err) => {
                    tracing::error!(%err, ?range, "failed to create video context");
                    support.disable("video context creation failed");
                    return None;
                }
            }
        }
        slot.as_mut()
    }

    /// Return a processor able to convert `input_size` into `output_size`.
    #[tracing::instrument(skip(self, device, support))]
    pub fn initialize_video_processor<D: VideoDevice + ?Sized>(
        &mut self,
        device: &mut D,
        support: &OverlaySupport,
        input_size: PixelSize,
        output_size: PixelSize,
        is_hdr: bool,
    ) -> Option<VideoProcessorId> {
        let range = DynamicRange::from_is_hdr(is_hdr);
        let wrapper = self.get_or_create_video_processor(device, support, range)?;

        if let Some(processor) = wrapper.processor
            && wrapper.input_size.contains(input_size)
            && wrapper.output_size.contains(output_size)
        {
            return Some(processor);
        }

        if let Some(old) = wrapper.processor.take()
            && let Err(err) = device.destroy_video_processor(old)
        {
            tracing::warn!(%err, "failed to release video processor");
        }

        match device.create_video_processor(wrapper.context, input_size, output_size) {
            Ok(processor) => {
                tracing::debug!(?input_size, ?output_size, is_hdr, "created video processor");
                wrapper.processor = Some(processor);
                wrapper.input_size = input_size;
                wrapper.output_size = output_size;
                Some(processor)
            }
            Err(err) => {
                tracing::error!(%err, "failed to create video processor");
                wrapper.input_size = PixelSize::default();
                wrapper.output_size = PixelSize::default();
                support.disable("video processor creation failed");
                None
            }
        }
    }

    /// Destroy every cached processor. Contexts are plain handles and are simply forgotten.
    pub fn release<D: VideoDevice + ?Sized>(&mut self, device: &mut D) {
        for entry in self.entries.iter_mut() {
            if let Some(wrapper) = entry.take()
                && let Some(processor) = wrapper.processor
                && let Err(err) = device.destroy_video_processor(processor)
            {
                tracing::warn!(%err, "failed to release video processor");
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/video/processor.rs"]
mod tests;
