//! Copies an image through protected device memory and back.
//!
//! Decodes the input file, pushes the pixels through the protected-image
//! round trip on the first Vulkan device of the system, and writes what came
//! back out as a PNG. If the two files decode identically, the protected
//! copy path works.

use protblit::{
    bitmap::{self, Bitmap},
    buffer::Buffer,
    device::Device,
    image::ProtectedImage,
    instance::Instance,
    transfer::ProtectedTransfer,
    DeviceSize, EnvironmentError, Error,
};
use std::{
    env,
    fmt::{Display, Error as FmtError, Formatter},
    path::{Path, PathBuf},
    process::ExitCode,
};

fn main() -> ExitCode {
    let args = env::args().skip(1).collect::<Vec<_>>();

    let (input, output) = match parse_args(&args) {
        Ok(paths) => paths,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    match run(&input, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("blit-protected: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// The two positional arguments, checked before any device work starts.
fn parse_args(args: &[String]) -> Result<(PathBuf, PathBuf), UsageError> {
    match args {
        [input, output, ..] => Ok((PathBuf::from(input), PathBuf::from(output))),
        _ => Err(UsageError),
    }
}

fn run(input: &Path, output: &Path) -> Result<(), Error> {
    let bitmap = Bitmap::open(input)?;
    let byte_length = bitmap.byte_length() as DeviceSize;

    let instance = Instance::new()?;

    let physical_devices = instance.enumerate_physical_devices()?;
    println!("{} physical devices", physical_devices.len());
    let physical_device = physical_devices
        .first()
        .copied()
        .ok_or(EnvironmentError::NoPhysicalDevice)?;

    let (device, queue) = Device::new(&instance, physical_device)?;
    println!(
        "vendor id {:04x}, device name {}",
        device.vendor_id(),
        device.device_name(),
    );

    let source = Buffer::transfer_source(&device, byte_length)?;
    let image = ProtectedImage::new(&device, bitmap.width(), bitmap.height())?;
    let destination = Buffer::transfer_destination(&device, byte_length)?;

    let mut mapped = source.memory().map(byte_length)?;
    mapped.write(bitmap.data());
    drop(mapped);

    let pipeline = ProtectedTransfer::new(&device, queue.family_index())?;
    pipeline.run(&queue, &source, &image, &destination)?;

    // The mapping must stay alive until the encoder has consumed it; the
    // scope drops it right after.
    {
        let mapped = destination.memory().map(byte_length)?;
        bitmap::save(output, mapped.as_slice(), bitmap.width(), bitmap.height())?;
    }

    println!("Saved to {}", output.display());

    Ok(())
}

#[derive(Debug)]
struct UsageError;

impl Display for UsageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "usage: blit-protected <input-file> <output-file>")
    }
}

#[cfg(test)]
mod tests {
    use super::parse_args;

    #[test]
    fn two_arguments_are_required() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&["in.png".to_owned()]).is_err());
    }

    #[test]
    fn both_paths_are_taken_positionally() {
        let (input, output) =
            parse_args(&["in.png".to_owned(), "out.png".to_owned()]).unwrap();
        assert_eq!(input.as_os_str(), "in.png");
        assert_eq!(output.as_os_str(), "out.png");
    }
}
