//! Hiring pipeline: jobs, candidates, interviews, offers, onboarding

use anyhow::Result;
use rusqlite::Connection;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    title            TEXT NOT NULL,
    department       TEXT,
    description      TEXT,
    required_skills  TEXT,
    experience_years INTEGER DEFAULT 0,
    salary_min       REAL,
    salary_max       REAL,
    location         TEXT,
    job_type         TEXT DEFAULT 'full_time',
    status           TEXT DEFAULT 'open' CHECK (status IN ('open','closed','on_hold','draft')),
    deadline         TEXT,
    created_by       TEXT,
    created_at       TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at       TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS candidates (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    name             TEXT NOT NULL,
    email            TEXT NOT NULL,
    job_id           INTEGER REFERENCES jobs(id),
    resume_text      TEXT,
    score            REAL DEFAULT 0,
    status           TEXT DEFAULT 'applied'
                       CHECK (status IN ('applied','screening','shortlisted','interview','offer','hired','rejected')),
    source           TEXT DEFAULT 'direct',
    experience_years INTEGER DEFAULT 0,
    current_role     TEXT,
    skills           TEXT,
    education        TEXT,
    shortlisted      INTEGER DEFAULT 0,
    created_at       TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at       TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS screening_notes (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    candidate_id INTEGER REFERENCES candidates(id),
    note         TEXT,
    created_by   TEXT,
    created_at   TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS interviews (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    candidate_id      INTEGER REFERENCES candidates(id),
    job_id            INTEGER REFERENCES jobs(id),
    interviewer_email TEXT,
    interviewer_name  TEXT,
    scheduled_at      TEXT,
    duration_mins     INTEGER DEFAULT 60,
    type              TEXT DEFAULT 'technical'
                        CHECK (type IN ('technical','hr','culture_fit','final','panel')),
    round             INTEGER DEFAULT 1,
    status            TEXT DEFAULT 'scheduled'
                        CHECK (status IN ('scheduled','completed','cancelled','rescheduled','no_show')),
    meeting_link      TEXT,
    notes             TEXT,
    created_at        TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS interview_feedback (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    interview_id    INTEGER REFERENCES interviews(id),
    candidate_id    INTEGER REFERENCES candidates(id),
    rating          INTEGER CHECK (rating BETWEEN 1 AND 5),
    technical_score INTEGER CHECK (technical_score BETWEEN 1 AND 10),
    culture_fit     INTEGER CHECK (culture_fit BETWEEN 1 AND 10),
    communication   INTEGER CHECK (communication BETWEEN 1 AND 10),
    notes           TEXT,
    recommendation  TEXT CHECK (recommendation IN ('strong_yes','yes','maybe','no','strong_no')),
    submitted_by    TEXT,
    created_at      TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS offers (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    candidate_id   INTEGER REFERENCES candidates(id),
    job_id         INTEGER REFERENCES jobs(id),
    salary         REAL,
    currency       TEXT DEFAULT 'INR',
    start_date     TEXT,
    benefits       TEXT,
    equity         TEXT,
    status         TEXT DEFAULT 'draft'
                     CHECK (status IN ('draft','pending_approval','approved','sent','accepted','declined','expired')),
    approved_by    TEXT,
    approved_at    TEXT,
    sent_at        TEXT,
    response_at    TEXT,
    decline_reason TEXT,
    created_by     TEXT,
    created_at     TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS onboarding (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    candidate_id   INTEGER REFERENCES candidates(id),
    job_id         INTEGER REFERENCES jobs(id),
    start_date     TEXT,
    buddy_email    TEXT,
    buddy_name     TEXT,
    completion_pct REAL DEFAULT 0,
    status         TEXT DEFAULT 'pending' CHECK (status IN ('pending','in_progress','completed')),
    welcome_sent   INTEGER DEFAULT 0,
    created_at     TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS onboarding_tasks (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    onboarding_id INTEGER REFERENCES onboarding(id),
    task_name     TEXT,
    category      TEXT CHECK (category IN ('it_setup','documentation','training','access','orientation','other')),
    assigned_to   TEXT,
    due_date      TEXT,
    completed     INTEGER DEFAULT 0,
    completed_at  TEXT,
    notes         TEXT
);
CREATE TABLE IF NOT EXISTS communications (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    candidate_id INTEGER REFERENCES candidates(id),
    type         TEXT,
    subject      TEXT,
    body_preview TEXT,
    sent_at      TEXT DEFAULT CURRENT_TIMESTAMP,
    sent_by      TEXT,
    status       TEXT DEFAULT 'logged'
);
CREATE TABLE IF NOT EXISTS audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_email  TEXT,
    role        TEXT,
    action      TEXT,
    entity_type TEXT,
    entity_id   INTEGER,
    details     TEXT,
    created_at  TEXT DEFAULT CURRENT_TIMESTAMP
);
";

const SEED: &str = "
INSERT INTO jobs (title, department, description, required_skills, experience_years,
                  salary_min, salary_max, location, job_type, status, deadline, created_by) VALUES
  ('Senior Backend Engineer','Engineering','Build scalable APIs and microservices for our core platform.',
   'Python, FastAPI, PostgreSQL, Redis, Docker, Kubernetes',4,1800000,2800000,'Bengaluru','full_time','open','2026-03-31','hr.manager@hrapp.com'),
  ('Product Manager','Product','Own product roadmap and coordinate cross-functional teams.',
   'Product strategy, Roadmapping, SQL, Agile, Stakeholder management',5,2000000,3200000,'Mumbai','full_time','open','2026-03-15','hr.manager@hrapp.com'),
  ('Data Scientist','Analytics','Build ML models and data pipelines for business insights.',
   'Python, scikit-learn, TensorFlow, SQL, Spark, Statistics',3,1600000,2400000,'Bengaluru','full_time','open','2026-04-15','hr.manager@hrapp.com'),
  ('DevOps Engineer','Engineering','Manage CI/CD pipelines, cloud infrastructure, and reliability.',
   'AWS, Terraform, Kubernetes, Docker, Jenkins, Linux',3,1400000,2200000,'Remote','full_time','open','2026-03-20','hr.manager@hrapp.com'),
  ('UI/UX Designer','Design','Design beautiful and intuitive user experiences for web and mobile.',
   'Figma, User Research, Prototyping, CSS, Design Systems',2,1000000,1600000,'Pune','full_time','open','2026-03-25','hr.manager@hrapp.com'),
  ('Frontend Engineer','Engineering','Build React-based frontends with great performance.',
   'React, TypeScript, CSS, Testing, REST APIs',3,1200000,2000000,'Bengaluru','full_time','on_hold','2026-04-01','recruiter@hrapp.com'),
  ('Marketing Manager','Marketing','Lead digital marketing campaigns and brand strategy.',
   'Digital marketing, SEO, Analytics, Content strategy, Budget management',4,1400000,2200000,'Mumbai','full_time','closed','2026-02-28','hr.manager@hrapp.com');

INSERT INTO candidates (name, email, job_id, resume_text, score, status, source,
                        experience_years, current_role, skills, education, shortlisted) VALUES
  ('Arjun Mehta','arjun.mehta@email.com',1,'Senior Python developer at Flipkart. 5 years building microservices.',
   88,'shortlisted','LinkedIn',5,'Senior Software Engineer','Python, FastAPI, PostgreSQL, Docker, Kubernetes','B.Tech CSE IIT Bombay',1),
  ('Divya Krishnan','divya.k@email.com',1,'Backend engineer at Swiggy. PostgreSQL expert.',
   82,'interview','Naukri',4,'Backend Engineer','Python, Django, PostgreSQL, Redis, AWS','B.Tech CSE BITS Pilani',1),
  ('Rohit Jain','rohit.jain@email.com',1,'Full stack developer, strong Python backend.',
   71,'screening','direct',3,'Software Developer','Python, Flask, MySQL, Docker','B.Tech CSE VIT',0),
  ('Neha Gupta','neha.gupta@email.com',1,'Backend developer at startup.',
   55,'applied','Indeed',2,'Junior Backend Dev','Python, Node.js, MongoDB','B.Tech IT Pune',0),
  ('Karan Shah','karan.shah@email.com',1,'DevOps-leaning backend engineer.',
   48,'rejected','Referral',1,'Junior Developer','Python, Bash, Linux','B.Tech ECE',0),
  ('Riya Desai','riya.desai@email.com',2,'PM at Razorpay for 5 years. Led 3 major product launches.',
   91,'offer','LinkedIn',5,'Senior Product Manager','Product strategy, SQL, Agile, Analytics','MBA IIM Ahmedabad',1),
  ('Amit Bose','amit.bose@email.com',2,'Associate PM at MakeMyTrip.',
   76,'interview','AngelList',3,'Associate PM','Roadmapping, Jira, SQL, User research','MBA ISB Hyderabad',1),
  ('Preet Kaur','preet.kaur@email.com',2,'Business analyst wanting to transition to PM.',
   62,'screening','direct',3,'Business Analyst','SQL, Excel, Stakeholder management','MBA Symbiosis',0),
  ('Siddharth Rao','sid.rao@email.com',3,'Data scientist at Amazon. Built recommendation systems.',
   89,'interview','LinkedIn',4,'Data Scientist II','Python, TensorFlow, SQL, Spark, Statistics','M.Tech Data Science IIT Delhi',1),
  ('Meera Nambiar','meera.n@email.com',3,'ML engineer at healthcare startup.',
   83,'shortlisted','Naukri',3,'ML Engineer','Python, scikit-learn, SQL, Tableau','B.Tech + M.Tech NIT',1),
  ('Farhan Khan','farhan.k@email.com',3,'Fresher with strong ML projects.',
   58,'applied','campus',1,'Intern','Python, scikit-learn, Pandas','M.Tech AI IIT Hyderabad',0),
  ('Tanvi Joshi','tanvi.j@email.com',4,'DevOps at Infosys. AWS certified.',
   85,'interview','LinkedIn',4,'DevOps Engineer','AWS, Terraform, Kubernetes, Docker, Jenkins','B.Tech CSE BITS Goa',1),
  ('Suresh Kumar','suresh.k@email.com',4,'Sysadmin transitioning to DevOps.',
   66,'screening','Naukri',5,'Systems Administrator','Linux, Bash, AWS basics, Docker','B.Tech ECE',0),
  ('Aisha Kapoor','aisha.k@email.com',5,'Product designer at Zomato. Figma expert.',
   87,'shortlisted','Behance',3,'Product Designer','Figma, User Research, Prototyping, CSS','B.Des NID Ahmedabad',1),
  ('Dev Malhotra','dev.m@email.com',5,'Freelance UX designer with startup experience.',
   73,'screening','direct',2,'Freelance Designer','Figma, Sketch, User testing','B.Des NIFT',0);

INSERT INTO interviews (candidate_id, job_id, interviewer_email, interviewer_name,
                        scheduled_at, duration_mins, type, round, status, meeting_link) VALUES
  (2,1,'hiring.manager@hrapp.com','Anjali Singh','2026-02-28 10:00:00',60,'technical',1,'completed','https://meet.google.com/abc-defg-hij'),
  (7,2,'hiring.manager@hrapp.com','Anjali Singh','2026-02-27 14:00:00',45,'hr',1,'completed','https://meet.google.com/xyz-pqrs-tuv'),
  (9,3,'hiring.manager@hrapp.com','Anjali Singh','2026-03-05 11:00:00',60,'technical',1,'scheduled','https://meet.google.com/ds1-abc-111'),
  (12,4,'hiring.manager@hrapp.com','Anjali Singh','2026-03-06 15:00:00',60,'technical',1,'scheduled','https://meet.google.com/dev-xyz-222'),
  (1,1,'v.nair@hrapp.com','Vikram Nair','2026-02-25 10:00:00',90,'final',2,'completed','https://meet.google.com/fin-abc-999');

INSERT INTO interview_feedback (interview_id, candidate_id, rating, technical_score,
                                culture_fit, communication, notes, recommendation, submitted_by) VALUES
  (1,2,4,8,7,8,'Strong PostgreSQL skills. Good system design. Needs improvement on Kubernetes.','yes','hiring.manager@hrapp.com'),
  (2,7,3,5,8,7,'Good product sense. SQL skills need more depth. Promising candidate.','maybe','hiring.manager@hrapp.com'),
  (5,1,5,10,9,9,'Exceptional. Best candidate we have seen this quarter. Strong offer recommended.','strong_yes','v.nair@hrapp.com');

INSERT INTO offers (candidate_id, job_id, salary, currency, start_date, benefits,
                    equity, status, approved_by, sent_at, created_by) VALUES
  (6,2,2800000,'INR','2026-03-15','Health insurance (family), 30 days PTO, Home office allowance 50k, ESOPs',
   '0.1% equity, 4-year vesting','sent','hr.manager@hrapp.com','2026-02-20 09:00:00','hr.manager@hrapp.com');

INSERT INTO onboarding (candidate_id, job_id, start_date, buddy_email, buddy_name,
                        completion_pct, status, welcome_sent) VALUES
  (6,2,'2026-03-15','amit.lead@hrapp.com','Amit Lead',20,'pending',0);

INSERT INTO onboarding_tasks (onboarding_id, task_name, category, assigned_to, due_date) VALUES
  (1,'Laptop provisioning and setup','it_setup','it@hrapp.com','2026-03-14'),
  (1,'Email and Slack account creation','it_setup','it@hrapp.com','2026-03-14'),
  (1,'ID card and access badge','documentation','admin@hrapp.com','2026-03-15'),
  (1,'Sign NDA and employment agreement','documentation','hr.manager@hrapp.com','2026-03-15'),
  (1,'Product onboarding training','training','hr.manager@hrapp.com','2026-03-20'),
  (1,'GitHub and Jira access setup','access','it@hrapp.com','2026-03-15'),
  (1,'Team orientation meeting','orientation','hiring.manager@hrapp.com','2026-03-16');

INSERT INTO communications (candidate_id, type, subject, body_preview, sent_by) VALUES
  (1,'application_confirmation','Application Received - Senior Backend Engineer','Thank you for applying...','system'),
  (2,'interview_invitation','Interview Scheduled - Technical Round 1','We would like to invite you...','recruiter@hrapp.com'),
  (5,'rejection','Application Update - Senior Backend Engineer','Thank you for your interest...','recruiter@hrapp.com'),
  (6,'offer','Offer Letter - Product Manager','We are pleased to extend...','hr.manager@hrapp.com'),
  (7,'interview_invitation','Interview Scheduled - HR Round','We would like to invite you...','recruiter@hrapp.com');
";

pub fn seed(conn: &Connection) -> Result<()> {
    conn.execute_batch(SEED)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_pipeline() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        seed(&conn)?;

        let open: i64 =
            conn.query_row("SELECT COUNT(*) FROM jobs WHERE status = 'open'", [], |r| r.get(0))?;
        assert_eq!(open, 5);
        let candidates: i64 = conn.query_row("SELECT COUNT(*) FROM candidates", [], |r| r.get(0))?;
        assert_eq!(candidates, 15);
        let tasks: i64 = conn.query_row(
            "SELECT COUNT(*) FROM onboarding_tasks WHERE onboarding_id = 1",
            [],
            |r| r.get(0),
        )?;
        assert_eq!(tasks, 7);
        Ok(())
    }

    #[test]
    fn test_rating_check_constraint() -> Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        seed(&conn)?;
        let bad = conn.execute(
            "INSERT INTO interview_feedback (interview_id, candidate_id, rating) VALUES (1, 2, 9)",
            [],
        );
        assert!(bad.is_err());
        Ok(())
    }
}
