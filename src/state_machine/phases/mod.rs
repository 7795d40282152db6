mod assignment_ready;
mod connecting;
mod done;
mod failed;
mod identified;
mod mesh_connecting;
mod ready;
mod reporting;
mod training;

pub use self::{
    assignment_ready::AssignmentReady,
    connecting::Connecting,
    done::Done,
    failed::{Failed, Resume},
    identified::Identified,
    mesh_connecting::MeshConnecting,
    ready::Ready,
    reporting::Reporting,
    training::Training,
};
