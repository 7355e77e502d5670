use std::collections::HashMap;

use super::types::{ContainerState, MachineState};

pub fn valid_container_transition(src: &ContainerState, dst: &ContainerState) -> bool {
    let state_transition_map: HashMap<ContainerState, Vec<ContainerState>> = {
        let mut map = HashMap::new();
        map.insert(
            ContainerState::Running,
            vec![
                ContainerState::Running,
                ContainerState::Stopped,
                ContainerState::Paused,
                ContainerState::Restarting,
                ContainerState::Dead,
            ],
        );
        map.insert(
            ContainerState::Stopped,
            vec![
                ContainerState::Stopped,
                ContainerState::Running,
                ContainerState::Dead,
            ],
        );
        map.insert(
            ContainerState::Restarting,
            vec![
                ContainerState::Running,
                ContainerState::Stopped,
                ContainerState::Dead,
            ],
        );
        map.insert(
            ContainerState::Paused,
            vec![ContainerState::Running, ContainerState::Stopped],
        );
        map.insert(ContainerState::Dead, vec![]);
        map
    };

    state_transition_map
        .get(src)
        .is_some_and(|valid_states| valid_states.contains(dst))
}

pub fn valid_machine_transition(src: &MachineState, dst: &MachineState) -> bool {
    let state_transition_map: HashMap<MachineState, Vec<MachineState>> = {
        let mut map = HashMap::new();
        map.insert(MachineState::Stopped, vec![MachineState::Starting]);
        map.insert(
            MachineState::Starting,
            vec![MachineState::Running, MachineState::Stopped],
        );
        map.insert(MachineState::Running, vec![MachineState::Stopping]);
        map.insert(MachineState::Stopping, vec![MachineState::Stopped]);
        map
    };

    state_transition_map
        .get(src)
        .is_some_and(|valid_states| valid_states.contains(dst))
}
