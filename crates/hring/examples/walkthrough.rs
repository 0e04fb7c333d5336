//! Walk a viewer through two rooms and print the fog after every step.
//!
//! Run with `RUST_LOG=hring=debug cargo run --example walkthrough` to see the
//! engine's own logging.

use std::collections::HashMap;

use glam::IVec2;
use hring::prelude::*;
use hring::sequence;

const MAP: [&str; 7] = [
    "                    ",
    " ################## ",
    " #.......#........# ",
    " #.@..............# ",
    " #.......#........# ",
    " ################## ",
    "                    ",
];

fn main() -> Result<(), SimError> {
    env_logger::init();

    let config = SimConfig::from_json_str(r#"{ "width": 20, "height": 7 }"#)?;
    let mut sim = Simulation::new(config)?;
    let player = build_map(sim.world_mut())?;

    render(&mut sim, player);
    for _ in 0..10 {
        steer(&mut sim, player, RIGHT);
        for _ in 0..4 {
            sim.advance(0.05);
        }
        render(&mut sim, player);
    }

    let popup = Effect::Popup {
        text: "the far room".into(),
        rise: 1.0,
        duration: 0.5,
    };
    sequence::start(sim.world_mut(), player, SequenceKind::Popup, popup)?;
    while sequence::is_active(sim.world(), player, SequenceKind::Popup) {
        sim.advance(0.1);
    }
    log::info!("done after {} ticks", sim.tick());
    Ok(())
}

fn build_map(world: &mut World) -> Result<Entity, SimError> {
    let mut player = None;
    for (y, row) in MAP.iter().enumerate() {
        for (x, c) in row.chars().enumerate() {
            let cell = Position(IVec2::new(x as i32, y as i32));
            match c {
                '#' => {
                    world.spawn((cell, Opaque, Solid, FogState::new(FogKind::Terrain)));
                }
                '.' | '@' => {
                    world.spawn((cell, FogState::new(FogKind::Terrain)));
                }
                _ => {}
            }
            if c == '@' {
                let e = world.spawn((
                    cell,
                    Frame::new(0.2).suspended(),
                    Viewer { light: 4.0 },
                    Renderable::default(),
                ));
                world.insert(e, Motion::new(e, 0.1).gated());
                player = Some(e);
            }
        }
    }
    player.ok_or_else(|| SimError::Config("map has no player".into()))
}

fn steer(sim: &mut Simulation, player: Entity, dir: IVec2) {
    if !hring::movement::steer(sim.world_mut(), player, dir) {
        log::warn!("{player} cannot move");
    }
}

fn render(sim: &mut Simulation, player: Entity) {
    let world = sim.world_mut();
    let mut cells: HashMap<IVec2, char> = HashMap::new();
    world.query_filtered::<(&Position, &FogState), Solid>(|_, (p, fog)| {
        let glyph = match fog.visibility {
            Visibility::Visible => '#',
            Visibility::Fog => 'x',
            Visibility::Hidden => ' ',
        };
        cells.insert(p.0, glyph);
    });
    world.query::<(&Position, &FogState)>(|_, (p, fog)| {
        let glyph = match fog.visibility {
            Visibility::Visible => '.',
            Visibility::Fog => ':',
            Visibility::Hidden => ' ',
        };
        cells.entry(p.0).or_insert(glyph);
    });
    if let Some(p) = world.get::<Position>(player) {
        cells.insert(p.0, '@');
    }

    let torus = *world.resource::<Torus>();
    println!("tick {}", world.resource::<Time>().tick());
    for y in 0..torus.height {
        let row: String = (0..torus.width)
            .map(|x| cells.get(&IVec2::new(x, y)).copied().unwrap_or(' '))
            .collect();
        println!("{row}");
    }
}
