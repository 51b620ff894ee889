// simulation_engine/mod.rs
pub mod grid;
pub mod intersections;
pub mod movement;
pub mod roads;
pub mod roster;
pub mod route_generation;
pub mod simulation;
pub mod traffic_light;
pub mod vehicles;
