mod ec2;
mod s3;

pub use ec2::Ec2Handler;
pub use s3::S3Handler;
