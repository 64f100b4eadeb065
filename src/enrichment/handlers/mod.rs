mod ec2;
mod ecs_eks;
mod iam;
mod lambda;
mod rds;
mod s3;

pub use ec2::Ec2EnrichmentHandler;
pub use ecs_eks::EcsEksEnrichmentHandler;
pub use iam::IamEnrichmentHandler;
pub use lambda::LambdaEnrichmentHandler;
pub use rds::RdsEnrichmentHandler;
pub use s3::S3EnrichmentHandler;
