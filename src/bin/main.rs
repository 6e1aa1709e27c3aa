use ensemble::{Group, MethodGroup};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut numbers = Group::create(vec![1, 2, 3]);
    println!("{:?}", numbers);
    numbers.add(3).add(4).remove(&2).map(|x| x * 10);
    println!("{:?}", numbers);

    let mut letters: MethodGroup<char, String> = ('a'..'d').collect();
    letters.attach_method("greet", |group: &Group<char>, c: &char, suffix: &String| {
        println!("{}{} ({} members)", c, suffix, group.len());
    });
    for c in letters.iter() {
        if let Some(id) = letters.id_of(c) {
            println!("{} -> {}", c, id);
        }
    }
    if let Err(err) = letters.call("greet", &"!".to_string()) {
        println!("error: {}", err);
    }

    letters.add('z');
    if let Err(err) = letters.call("greet", &"?".to_string()) {
        println!("error: {}", err);
    }
}
