//! Sample data used when no daemon is available.

use chrono::{DateTime, Duration, Utc};

use super::types::{
    ContainerState, ContainerViewModel, DistroInfo, ImageViewModel, MachineState,
    MachineViewModel, NetworkViewModel, PortMapping, VolumeViewModel,
};

fn tcp(host_port: u16, container_port: u16) -> PortMapping {
    PortMapping {
        host_port,
        container_port,
        protocol: "tcp".to_string(),
    }
}

pub fn sample_containers(now: DateTime<Utc>) -> Vec<ContainerViewModel> {
    vec![
        ContainerViewModel {
            id: "a1b2c3d4e5f6".to_string(),
            name: "nginx".to_string(),
            image: "nginx:latest".to_string(),
            state: ContainerState::Running,
            ports: vec![tcp(8080, 80), tcp(443, 443)],
            created_at: now - Duration::hours(2),
            compose_project: Some("my-project".to_string()),
            cpu_percent: 0.5,
            memory_mb: 25.4,
            memory_limit_mb: 512.0,
        },
        ContainerViewModel {
            id: "b2c3d4e5f6a7".to_string(),
            name: "postgres".to_string(),
            image: "postgres:15".to_string(),
            state: ContainerState::Running,
            ports: vec![tcp(5432, 5432)],
            created_at: now - Duration::days(1),
            compose_project: Some("my-project".to_string()),
            cpu_percent: 1.2,
            memory_mb: 128.5,
            memory_limit_mb: 1024.0,
        },
        ContainerViewModel {
            id: "c3d4e5f6a7b8".to_string(),
            name: "redis".to_string(),
            image: "redis:alpine".to_string(),
            state: ContainerState::Running,
            ports: vec![tcp(6379, 6379)],
            created_at: now - Duration::hours(3),
            compose_project: Some("my-project".to_string()),
            cpu_percent: 0.1,
            memory_mb: 12.3,
            memory_limit_mb: 256.0,
        },
        ContainerViewModel {
            id: "d4e5f6a7b8c9".to_string(),
            name: "my-app".to_string(),
            image: "my-app:dev".to_string(),
            state: ContainerState::Running,
            ports: vec![tcp(3000, 3000)],
            created_at: now - Duration::minutes(5),
            compose_project: None,
            cpu_percent: 2.5,
            memory_mb: 256.0,
            memory_limit_mb: 512.0,
        },
        ContainerViewModel {
            id: "e5f6a7b8c9d0".to_string(),
            name: "old-service".to_string(),
            image: "node:18".to_string(),
            state: ContainerState::Stopped,
            ports: vec![],
            created_at: now - Duration::days(2),
            compose_project: None,
            cpu_percent: 0.0,
            memory_mb: 0.0,
            memory_limit_mb: 512.0,
        },
    ]
}

fn image(
    id: &str,
    repository: &str,
    tag: &str,
    size_bytes: u64,
    created_at: DateTime<Utc>,
    in_use: bool,
) -> ImageViewModel {
    ImageViewModel {
        id: format!("sha256:{}", id),
        repository: repository.to_string(),
        tag: tag.to_string(),
        size_bytes,
        created_at,
        in_use,
        os: "linux".to_string(),
        architecture: "arm64".to_string(),
    }
}

pub fn sample_images(now: DateTime<Utc>) -> Vec<ImageViewModel> {
    vec![
        image("4f1c3e2a9b8d7c6e5f4a3b2c1d0e9f8a", "nginx", "latest", 187_000_000, now - Duration::days(12), true),
        image("5a2d4f3b0c9e8d7f6a5b4c3d2e1f0a9b", "postgres", "15", 412_000_000, now - Duration::days(40), true),
        image("6b3e5a4c1d0f9e8a7b6c5d4e3f2a1b0c", "redis", "alpine", 41_000_000, now - Duration::days(3), true),
        image("7c4f6b5d2e1a0f9b8c7d6e5f4a3b2c1d", "my-app", "dev", 1_250_000_000, now - Duration::hours(1), true),
        image("8d5a7c6e3f2b1a0c9d8e7f6a5b4c3d2e", "node", "18", 1_090_000_000, now - Duration::days(95), true),
        image("9e6b8d7f4a3c2b1d0e9f8a7b6c5d4e3f", "alpine", "3.19", 7_800_000, now - Duration::days(60), false),
        image("0f7c9e8a5b4d3c2e1f0a9b8c7d6e5f4a", "<none>", "<none>", 320_000_000, now - Duration::days(9), false),
    ]
}

pub fn sample_volumes(now: DateTime<Utc>) -> Vec<VolumeViewModel> {
    vec![
        VolumeViewModel {
            name: "my-project_pgdata".to_string(),
            driver: "local".to_string(),
            mount_point: "/var/lib/docker/volumes/my-project_pgdata/_data".to_string(),
            size_bytes: Some(245_000_000),
            created_at: now - Duration::days(1),
            in_use: true,
            container_names: vec!["postgres".to_string()],
        },
        VolumeViewModel {
            name: "my-project_redis".to_string(),
            driver: "local".to_string(),
            mount_point: "/var/lib/docker/volumes/my-project_redis/_data".to_string(),
            size_bytes: Some(850_000),
            created_at: now - Duration::hours(3),
            in_use: true,
            container_names: vec!["redis".to_string()],
        },
        VolumeViewModel {
            name: "build-cache".to_string(),
            driver: "local".to_string(),
            mount_point: "/var/lib/docker/volumes/build-cache/_data".to_string(),
            size_bytes: Some(2_100_000_000),
            created_at: now - Duration::days(21),
            in_use: false,
            container_names: vec![],
        },
        VolumeViewModel {
            name: "nfs-share".to_string(),
            driver: "nfs".to_string(),
            mount_point: "/mnt/nfs-share".to_string(),
            size_bytes: None,
            created_at: now - Duration::days(45),
            in_use: false,
            container_names: vec![],
        },
    ]
}

fn network(
    id: &str,
    name: &str,
    driver: &str,
    scope: &str,
    created_at: DateTime<Utc>,
    container_count: usize,
) -> NetworkViewModel {
    NetworkViewModel {
        id: id.to_string(),
        name: name.to_string(),
        driver: driver.to_string(),
        scope: scope.to_string(),
        created_at,
        internal: false,
        attachable: false,
        container_count,
    }
}

pub fn sample_networks(now: DateTime<Utc>) -> Vec<NetworkViewModel> {
    vec![
        network(
            "3f9a1c7e5b2d4f6a8c0e2b4d6f8a0c2e4b6d8f0a2c4e6b8d0f2a4c6e8b0d2f4a",
            "bridge",
            "bridge",
            "local",
            now - Duration::days(90),
            1,
        ),
        network(
            "7b2e4d6f8a0c2e4b6d8f0a2c4e6b8d0f2a4c6e8b0d2f4a6c8e0b2d4f6a8c0e2b",
            "host",
            "host",
            "local",
            now - Duration::days(90),
            0,
        ),
        network(
            "c4e6b8d0f2a4c6e8b0d2f4a6c8e0b2d4f6a8c0e2b4d6f8a0c2e4b6d8f0a2c4e6",
            "none",
            "null",
            "local",
            now - Duration::days(90),
            0,
        ),
        NetworkViewModel {
            attachable: true,
            ..network(
                "e8b0d2f4a6c8e0b2d4f6a8c0e2b4d6f8a0c2e4b6d8f0a2c4e6b8d0f2a4c6e8b0",
                "my-project_default",
                "bridge",
                "local",
                now - Duration::days(1),
                3,
            )
        },
    ]
}

pub fn sample_machines(now: DateTime<Utc>) -> Vec<MachineViewModel> {
    vec![
        MachineViewModel {
            id: "m-ubuntu-01".to_string(),
            name: "ubuntu".to_string(),
            distro: DistroInfo {
                name: "ubuntu".to_string(),
                version: "24.04".to_string(),
                display_name: "Ubuntu 24.04 LTS".to_string(),
            },
            state: MachineState::Running,
            cpu_cores: 4,
            memory_gb: 8,
            disk_gb: 64,
            ip_address: Some("192.168.64.2".to_string()),
            created_at: now - Duration::days(14),
        },
        MachineViewModel {
            id: "m-alpine-01".to_string(),
            name: "alpine-dev".to_string(),
            distro: DistroInfo {
                name: "alpine".to_string(),
                version: "3.19".to_string(),
                display_name: "Alpine Linux 3.19".to_string(),
            },
            state: MachineState::Stopped,
            cpu_cores: 2,
            memory_gb: 2,
            disk_gb: 16,
            ip_address: None,
            created_at: now - Duration::days(3),
        },
    ]
}
