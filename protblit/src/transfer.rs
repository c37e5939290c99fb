//! The protected transfer: one command buffer, two barriers, two copies.
//!
//! The command sequence is produced first as plain data by
//! [`transfer_commands`] and only then lowered to API calls, so the exact
//! barrier/copy ordering the correctness of the pipeline rests on can be
//! inspected and asserted without a device.
//!
//! The sequence is:
//!
//! 1. a barrier making the host-written source buffer visible to
//!    transfer reads and moving the image from its undefined initial layout
//!    into the copy-destination layout;
//! 2. the buffer-to-image copy of the full extent;
//! 3. a barrier ordering that write before the read-back, moving the image
//!    into the copy-source layout and declaring the destination buffer a
//!    transfer-write target;
//! 4. the image-to-buffer copy of the full extent.
//!
//! Without the second barrier the read-back could start before the upload
//! has finished on real hardware; the two layout transitions are the only
//! ones the image ever goes through.

use crate::{
    buffer::Buffer,
    device::{Device, Queue},
    image::ProtectedImage,
    VulkanError,
};
use ash::vk;
use smallvec::{smallvec, SmallVec};
use std::{slice, sync::Arc};

/// Which of the two host-visible buffers a barrier applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferRole {
    Source,
    Destination,
}

/// One step of the recorded transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferCommand {
    /// A `transfer -> transfer` pipeline barrier covering one buffer in full
    /// and the whole color subresource of the image.
    Barrier {
        buffer: BufferRole,
        buffer_dst_access: vk::AccessFlags,
        image_src_access: vk::AccessFlags,
        image_dst_access: vk::AccessFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
    /// Copy the full `width x height x 1` extent from the source buffer into
    /// the image.
    CopyBufferToImage { extent: [u32; 2] },
    /// Copy the full extent back out of the image into the destination
    /// buffer.
    CopyImageToBuffer { extent: [u32; 2] },
}

/// Builds the command sequence for an image of the given extent.
pub fn transfer_commands(extent: [u32; 2]) -> SmallVec<[TransferCommand; 4]> {
    smallvec![
        TransferCommand::Barrier {
            buffer: BufferRole::Source,
            buffer_dst_access: vk::AccessFlags::TRANSFER_READ,
            image_src_access: vk::AccessFlags::empty(),
            image_dst_access: vk::AccessFlags::TRANSFER_WRITE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        },
        TransferCommand::CopyBufferToImage { extent },
        TransferCommand::Barrier {
            buffer: BufferRole::Destination,
            buffer_dst_access: vk::AccessFlags::TRANSFER_WRITE,
            image_src_access: vk::AccessFlags::TRANSFER_WRITE,
            image_dst_access: vk::AccessFlags::TRANSFER_READ,
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        },
        TransferCommand::CopyImageToBuffer { extent },
    ]
}

/// A protected command pool with the one primary command buffer the
/// transfer records into.
///
/// Protected resources can only be touched from protected command buffers,
/// which in turn can only come from a protected pool.
pub struct ProtectedTransfer {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    device: Arc<Device>,
}

impl ProtectedTransfer {
    /// Creates the pool on the given queue family and allocates the command
    /// buffer.
    pub fn new(
        device: &Arc<Device>,
        queue_family_index: u32,
    ) -> Result<ProtectedTransfer, VulkanError> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER
                    | vk::CommandPoolCreateFlags::PROTECTED,
            )
            .queue_family_index(queue_family_index);

        let command_pool = unsafe { device.handle().create_command_pool(&pool_info, None) }?;

        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffers = unsafe { device.handle().allocate_command_buffers(&allocate_info) };
        let command_buffer = match command_buffers {
            Ok(command_buffers) => command_buffers[0],
            Err(err) => {
                unsafe { device.handle().destroy_command_pool(command_pool, None) };
                return Err(err.into());
            }
        };

        Ok(ProtectedTransfer {
            command_pool,
            command_buffer,
            device: device.clone(),
        })
    }

    /// Records the transfer, submits it once and waits for the device to go
    /// idle.
    ///
    /// The submission carries no semaphores and no fence; the device-idle
    /// wait is the single completion signal. The protected-submit marker is
    /// chained so the queue accepts the protected command buffer.
    pub fn run(
        &self,
        queue: &Queue,
        source: &Buffer,
        image: &ProtectedImage,
        destination: &Buffer,
    ) -> Result<(), VulkanError> {
        let commands = transfer_commands([image.width(), image.height()]);

        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.command_buffer, &begin_info)
        }?;

        for command in &commands {
            self.record(command, source, image, destination);
        }

        unsafe { self.device.handle().end_command_buffer(self.command_buffer) }?;

        let command_buffers = [self.command_buffer];
        let mut protected_submit = vk::ProtectedSubmitInfo::default().protected_submit(true);
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .push_next(&mut protected_submit);

        unsafe {
            self.device.handle().queue_submit(
                queue.handle(),
                slice::from_ref(&submit_info),
                vk::Fence::null(),
            )
        }?;

        self.device.wait_idle()
    }

    /// Lowers one planned command into the command buffer.
    fn record(
        &self,
        command: &TransferCommand,
        source: &Buffer,
        image: &ProtectedImage,
        destination: &Buffer,
    ) {
        match *command {
            TransferCommand::Barrier {
                buffer,
                buffer_dst_access,
                image_src_access,
                image_dst_access,
                old_layout,
                new_layout,
            } => {
                let buffer_handle = match buffer {
                    BufferRole::Source => source.handle(),
                    BufferRole::Destination => destination.handle(),
                };

                let buffer_barrier = vk::BufferMemoryBarrier::default()
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(buffer_dst_access)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(buffer_handle)
                    .offset(0)
                    .size(vk::WHOLE_SIZE);

                let image_barrier = vk::ImageMemoryBarrier::default()
                    .src_access_mask(image_src_access)
                    .dst_access_mask(image_dst_access)
                    .old_layout(old_layout)
                    .new_layout(new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image.handle())
                    .subresource_range(color_subresource_range());

                unsafe {
                    self.device.handle().cmd_pipeline_barrier(
                        self.command_buffer,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::PipelineStageFlags::TRANSFER,
                        vk::DependencyFlags::empty(),
                        &[],
                        slice::from_ref(&buffer_barrier),
                        slice::from_ref(&image_barrier),
                    )
                };
            }
            TransferCommand::CopyBufferToImage { extent } => {
                let region = buffer_image_copy(extent);

                unsafe {
                    self.device.handle().cmd_copy_buffer_to_image(
                        self.command_buffer,
                        source.handle(),
                        image.handle(),
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        slice::from_ref(&region),
                    )
                };
            }
            TransferCommand::CopyImageToBuffer { extent } => {
                let region = buffer_image_copy(extent);

                unsafe {
                    self.device.handle().cmd_copy_image_to_buffer(
                        self.command_buffer,
                        image.handle(),
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        destination.handle(),
                        slice::from_ref(&region),
                    )
                };
            }
        }
    }
}

impl Drop for ProtectedTransfer {
    fn drop(&mut self) {
        // Destroying the pool frees the command buffer with it.
        unsafe {
            self.device
                .handle()
                .destroy_command_pool(self.command_pool, None)
        };
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

fn buffer_image_copy(extent: [u32; 2]) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: extent[0],
        buffer_image_height: extent[1],
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: extent[0],
            height: extent[1],
            depth: 1,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{transfer_commands, BufferRole, ProtectedTransfer, TransferCommand};
    use ash::vk;

    #[test]
    fn two_barriers_bracket_two_copies() {
        let commands = transfer_commands([640, 480]);

        assert_eq!(commands.len(), 4);
        assert!(matches!(commands[0], TransferCommand::Barrier { .. }));
        assert!(matches!(
            commands[1],
            TransferCommand::CopyBufferToImage { .. }
        ));
        assert!(matches!(commands[2], TransferCommand::Barrier { .. }));
        assert!(matches!(
            commands[3],
            TransferCommand::CopyImageToBuffer { .. }
        ));
    }

    #[test]
    fn image_layouts_transition_in_order() {
        let commands = transfer_commands([640, 480]);

        let TransferCommand::Barrier {
            old_layout, new_layout, ..
        } = commands[0]
        else {
            panic!("expected a barrier");
        };
        assert_eq!(old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let TransferCommand::Barrier {
            old_layout, new_layout, ..
        } = commands[2]
        else {
            panic!("expected a barrier");
        };
        assert_eq!(old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    }

    #[test]
    fn first_barrier_prepares_upload() {
        let commands = transfer_commands([2, 1]);

        assert_eq!(
            commands[0],
            TransferCommand::Barrier {
                buffer: BufferRole::Source,
                buffer_dst_access: vk::AccessFlags::TRANSFER_READ,
                image_src_access: vk::AccessFlags::empty(),
                image_dst_access: vk::AccessFlags::TRANSFER_WRITE,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            },
        );
    }

    #[test]
    fn second_barrier_orders_write_before_readback() {
        let commands = transfer_commands([2, 1]);

        assert_eq!(
            commands[2],
            TransferCommand::Barrier {
                buffer: BufferRole::Destination,
                buffer_dst_access: vk::AccessFlags::TRANSFER_WRITE,
                image_src_access: vk::AccessFlags::TRANSFER_WRITE,
                image_dst_access: vk::AccessFlags::TRANSFER_READ,
                old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            },
        );
    }

    #[test]
    fn copies_cover_the_full_extent() {
        let commands = transfer_commands([123, 45]);

        assert_eq!(
            commands[1],
            TransferCommand::CopyBufferToImage { extent: [123, 45] },
        );
        assert_eq!(
            commands[3],
            TransferCommand::CopyImageToBuffer { extent: [123, 45] },
        );
    }

    #[test]
    fn create_protected_pool() {
        let (device, queue) = protected_context!();

        let _transfer = match ProtectedTransfer::new(&device, queue.family_index()) {
            Ok(transfer) => transfer,
            Err(_) => return,
        };
    }
}
